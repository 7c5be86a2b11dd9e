use pretty_assertions::assert_eq;
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::bfir::{parse, ExprKind, Program};
use crate::execution::*;
use crate::peephole::optimize;
use crate::report::ExecutionReport;

fn config(tape_size: usize) -> Config {
    Config::default().with_tape_size(NonZeroUsize::new(tape_size).unwrap())
}

fn checked(tape_size: usize) -> Config {
    config(tape_size).with_overflow_checking(true)
}

fn raw(source: &str) -> Program {
    parse(source).unwrap()
}

fn optimized(source: &str) -> Program {
    optimize(parse(source).unwrap())
}

/// Run `program` and hand back the interpreter for inspection.
fn run_program<'a>(
    program: &Program,
    config: Config,
    input: &'a [u8],
) -> (
    Result<ExecutionReport, ExecutionError>,
    Interpreter<&'a [u8], Vec<u8>>,
) {
    let mut interpreter = Interpreter::new(config, input, Vec::new());
    let result = interpreter.run(program);
    (result, interpreter)
}

#[test]
fn prints_a_character() {
    let (result, interpreter) = run_program(&optimized("++++++++[>++++++++<-]>+."), config(8), b"");
    let report = result.unwrap();

    assert_eq!(interpreter.output(), b"A");
    assert_eq!(report.pointer, 1);
    assert!(!report.input_exhausted);
}

#[test]
fn multiply_into_next_cell() {
    let program = optimized("+++++[->++<]");
    let (result, interpreter) = run_program(&program, config(4), b"");
    let report = result.unwrap();

    assert_eq!(&interpreter.tape().cells()[..2], &[0, 10]);
    assert_eq!(report.pointer, 0);
    assert_eq!(report.counts[ExprKind::Copy], 1);
    assert_eq!(report.counts[ExprKind::While], 0);
}

#[test]
fn copy_matches_literal_loop() {
    let source = ",>+++>,<<[->+++>--<<]";
    let input = [7, 100];

    let (literal, literal_interpreter) = run_program(&raw(source), config(4), &input);
    let (copied, copied_interpreter) = run_program(&optimized(source), config(4), &input);
    literal.unwrap();
    copied.unwrap();

    assert_eq!(literal_interpreter.tape(), copied_interpreter.tape());
    assert_eq!(copied_interpreter.tape().cells(), &[0, 24, 86, 0]);
}

#[test]
fn copy_adds_to_existing_value() {
    let (result, interpreter) = run_program(&optimized(",>,<[->+<]"), config(2), &[3, 4]);
    result.unwrap();
    assert_eq!(interpreter.tape().cells(), &[0, 7]);
}

#[test]
fn copy_wraps_without_checking() {
    let (result, interpreter) = run_program(&optimized(",[->+++<]"), config(2), &[100]);
    result.unwrap();
    assert_eq!(interpreter.tape().cells(), &[0, 44]);
}

#[test]
fn copy_overflow_leaves_tape_untouched() {
    let (result, interpreter) = run_program(&optimized(",[->+<>>+++<<]"), checked(3), &[100]);

    match result {
        Err(ExecutionError::ValueOverflow { pointer, .. }) => assert_eq!(pointer, 2),
        other => panic!("expected an overflow, got {:?}", other),
    }
    assert_eq!(interpreter.tape().cells(), &[100, 0, 0]);
}

#[test]
fn copy_underflow() {
    let (result, _) = run_program(&optimized(",>+<[->-<]"), checked(2), &[2]);
    assert!(matches!(
        result,
        Err(ExecutionError::ValueUnderflow { pointer: 1, .. })
    ));
}

#[test]
fn copy_target_off_the_tape() {
    let (result, _) = run_program(&optimized("+[-<+>]"), checked(2), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerUnderflow { pointer: 0, amount: 1, .. })
    ));

    let (result, _) = run_program(&optimized("+[-<+>]"), config(2), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerOutOfBounds { pointer: -1, .. })
    ));
}

#[test]
fn copy_of_zero_cell_does_nothing() {
    // The target is off the tape, but the loop would never run.
    let (result, interpreter) = run_program(&optimized("[-<+>]"), checked(1), b"");
    let report = result.unwrap();
    assert_eq!(report.counts[ExprKind::Copy], 1);
    assert_eq!(interpreter.tape().cells(), &[0]);
}

#[test]
fn load_zero_is_constant_time() {
    let program = optimized(&format!("{}[-]", "+".repeat(200)));
    let (result, interpreter) = run_program(&program, config(1), b"");
    let report = result.unwrap();

    assert_eq!(interpreter.tape().cells(), &[0]);
    assert_eq!(report.pointer, 0);
    assert_eq!(report.counts[ExprKind::LoadZero], 1);
    assert_eq!(report.counts[ExprKind::MultipleValueIncrement], 1);
    assert_eq!(report.counts[ExprKind::MultipleValueDecrement], 0);
    assert_eq!(report.counts.total(), 2);
}

#[test]
fn literal_clear_loop_counts_every_step() {
    let (result, _) = run_program(&raw("+++[-]"), config(1), b"");
    let report = result.unwrap();

    assert_eq!(report.counts[ExprKind::ValueIncrement], 3);
    assert_eq!(report.counts[ExprKind::ValueDecrement], 3);
    assert_eq!(report.counts[ExprKind::While], 1);
    assert_eq!(report.counts.total(), 7);
}

#[test]
fn value_overflow_checked() {
    let source = "+".repeat(256);

    let (result, interpreter) = run_program(&raw(&source), checked(1), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::ValueOverflow { pointer: 0, .. })
    ));
    assert_eq!(interpreter.tape().cells(), &[255]);
    assert_eq!(interpreter.counts()[ExprKind::ValueIncrement], 255);

    // A fused run fails as a whole, before touching the cell.
    let (result, interpreter) = run_program(&optimized(&source), checked(1), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::ValueOverflow { pointer: 0, .. })
    ));
    assert_eq!(interpreter.tape().cells(), &[0]);
    assert_eq!(interpreter.counts().total(), 0);
}

#[test]
fn value_wraps_unchecked() {
    let source = "+".repeat(256);
    for program in &[raw(&source), optimized(&source)] {
        let (result, interpreter) = run_program(program, config(1), b"");
        result.unwrap();
        assert_eq!(interpreter.tape().cells(), &[0]);
    }

    for program in &[raw("-"), optimized("---")] {
        let (result, interpreter) = run_program(program, config(1), b"");
        result.unwrap();
        assert!(interpreter.tape().cells()[0] >= 253);
    }
}

#[test]
fn value_underflow_checked() {
    let (result, interpreter) = run_program(&optimized("+--"), checked(1), b"");
    match result {
        Err(ExecutionError::ValueUnderflow { pointer, position }) => {
            assert_eq!(pointer, 0);
            assert_eq!((position.start, position.end), (1, 2));
        }
        other => panic!("expected an underflow, got {:?}", other),
    }
    assert_eq!(interpreter.tape().cells(), &[1]);
}

#[test]
fn pointer_underflow_checked() {
    let (result, interpreter) = run_program(&raw("<"), checked(4), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerUnderflow { pointer: 0, amount: 1, .. })
    ));
    assert_eq!(interpreter.tape().pointer(), 0);
}

#[test]
fn pointer_overflow_checked() {
    let (result, interpreter) = run_program(&raw(">>>"), checked(3), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerOverflow { pointer: 2, amount: 1, .. })
    ));
    assert_eq!(interpreter.tape().pointer(), 2);

    let (result, interpreter) = run_program(&optimized(">>>"), checked(3), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerOverflow { pointer: 0, amount: 3, .. })
    ));
    assert_eq!(interpreter.tape().pointer(), 0);
}

#[test]
fn pointer_excursion_unchecked() {
    let (result, interpreter) = run_program(&optimized("<<>>>+"), config(2), b"");
    result.unwrap();
    assert_eq!(interpreter.tape().cells(), &[0, 1]);

    let (result, interpreter) = run_program(&optimized("<+"), config(2), b"");
    assert!(matches!(
        result,
        Err(ExecutionError::PointerOutOfBounds { pointer: -1, .. })
    ));
    assert_eq!(interpreter.tape().pointer(), -1);
}

#[test]
fn echo_input() {
    let (result, interpreter) = run_program(&optimized(",.>,."), config(2), b"hi");
    result.unwrap();
    assert_eq!(interpreter.output(), b"hi");
}

#[test]
fn input_exhaustion_ends_run_quietly() {
    let (result, interpreter) = run_program(&optimized(",[.,]"), config(1), b"abc");
    let report = result.unwrap();

    assert!(report.input_exhausted);
    assert_eq!(interpreter.output(), b"abc");
    assert_eq!(report.counts[ExprKind::Input], 3);
    assert_eq!(report.counts[ExprKind::While], 0);
}

#[test]
fn input_exhaustion_raised_when_asked() {
    let config = config(1).with_raise_on_input_exhaustion(true);
    let (result, _) = run_program(&optimized(",,"), config, b"a");

    match result {
        Err(ExecutionError::InputFinished { position }) => assert_eq!(position.start, 1),
        other => panic!("expected input finished, got {:?}", other),
    }
}

struct FailingIo;

impl Read for FailingIo {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "no input"))
    }
}

impl Write for FailingIo {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_errors_propagate() {
    let result = execute(&optimized("+."), config(1), &b""[..], FailingIo);
    match result {
        Err(ExecutionError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected an io error, got {:?}", other),
    }
}

#[test]
fn read_errors_propagate() {
    let result = execute(&optimized(","), config(1), FailingIo, Vec::new());
    match result {
        Err(ExecutionError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("expected an io error, got {:?}", other),
    }
}

/// Fails every other read with `Interrupted`.
struct InterruptedReader<'a> {
    bytes: &'a [u8],
    interrupt: bool,
}

impl Read for InterruptedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.interrupt = !self.interrupt;
        if self.interrupt {
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal"))
        } else {
            self.bytes.read(buf)
        }
    }
}

#[test]
fn interrupted_reads_are_retried() {
    let input = InterruptedReader {
        bytes: b"ok",
        interrupt: false,
    };
    let mut output = vec![];
    let report = execute(&optimized(",.,.,."), config(1), input, &mut output).unwrap();

    assert_eq!(output, b"ok");
    assert!(report.input_exhausted);
}

#[test]
fn cancelled_before_start() {
    let token = CancelToken::new();
    token.cancel();

    let mut interpreter =
        Interpreter::new(config(1), &b""[..], Vec::new()).with_cancel_token(token);
    let result = interpreter.run(&optimized("+++."));

    assert!(matches!(result, Err(ExecutionError::Cancelled)));
    assert_eq!(interpreter.counts().total(), 0);
    assert!(interpreter.output().is_empty());
}

/// Cancels its token as soon as anything is written.
struct CancelOnWrite {
    token: CancelToken,
    written: Vec<u8>,
}

impl Write for CancelOnWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        self.token.cancel();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn cancelled_mid_run() {
    let token = CancelToken::new();
    let output = CancelOnWrite {
        token: token.clone(),
        written: vec![],
    };
    let mut interpreter =
        Interpreter::new(config(1), &b""[..], output).with_cancel_token(token);
    let result = interpreter.run(&raw("+.+.+."));

    assert!(matches!(result, Err(ExecutionError::Cancelled)));
    assert_eq!(interpreter.counts()[ExprKind::ValueIncrement], 1);
    assert_eq!(interpreter.counts()[ExprKind::Output], 1);
    assert_eq!(interpreter.counts().total(), 2);
    assert_eq!(interpreter.tape().cells(), &[1]);
    assert_eq!(interpreter.output().written, vec![1]);
}

#[test]
fn cancel_infinite_loop_from_another_thread() {
    let mut interpreter = Interpreter::new(config(1), &b""[..], Vec::new());
    let token = interpreter.cancel_token();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        token.cancel();
    });

    // An empty body still checks for cancellation between iterations.
    let result = interpreter.run(&optimized("+[]"));
    canceller.join().unwrap();

    assert!(matches!(result, Err(ExecutionError::Cancelled)));
    assert_eq!(interpreter.counts()[ExprKind::While], 0);
}

#[test]
fn each_run_starts_fresh() {
    let program = optimized(">+++.");
    let mut interpreter = Interpreter::new(config(2), &b""[..], Vec::new());

    let first = interpreter.run(&program).unwrap();
    let second = interpreter.run(&program).unwrap();

    assert_eq!(first, second);
    assert_eq!(interpreter.tape().cells(), &[0, 3]);
    assert_eq!(interpreter.output(), &[3, 3]);
}

#[test]
fn memory_errors_are_grouped() {
    let (result, _) = run_program(&raw("-"), checked(1), b"");
    let err = result.unwrap_err();
    assert!(err.is_memory_error());
    assert_eq!(err.position().map(|p| p.start), Some(0));

    assert!(!ExecutionError::Cancelled.is_memory_error());
    assert_eq!(ExecutionError::Cancelled.position(), None);
}

#[test]
fn error_diagnostic_points_at_node() {
    colored::control::set_override(false);
    let source = "+>>";
    let (result, _) = run_program(&optimized(source), checked(2), b"");
    let rendered = result.unwrap_err().to_diagnostic().render(source);

    assert!(rendered.starts_with("error: pointer overflow"));
    assert!(rendered.ends_with("1 | +>>\n  |  ^^"));
}

#[test]
fn pipeline_runs_source() {
    let mut output = vec![];
    let report = crate::run("++++++[>+++++++<-]>.", Config::default(), &b""[..], &mut output).unwrap();

    assert_eq!(output, b"*");
    assert_eq!(report.counts[ExprKind::Copy], 1);
}

#[test]
fn pipeline_reports_parse_errors() {
    let result = crate::run("[", Config::default(), &b""[..], Vec::new());
    assert!(matches!(result, Err(crate::Error::Parse(_))));
}

#[test]
fn pipeline_runs_deeply_nested_source() {
    let depth = 300;
    let source = format!("+{}{}>+.", "[-".repeat(depth), "]".repeat(depth));
    let mut output = vec![];
    let report = crate::run(&source, config(2), &b""[..], &mut output).unwrap();

    assert_eq!(output, [1]);
    assert_eq!(report.pointer, 1);
}

#[test]
fn pipeline_rejects_runaway_nesting() {
    let source = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
    let result = crate::run(&source, Config::default(), &b""[..], Vec::new());

    match result {
        Err(crate::Error::Parse(err)) => {
            assert_eq!(err.position.start, crate::MAX_NESTING_DEPTH)
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}
