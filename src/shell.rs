//! Shell fragments baked into the workload's containers.
//!
//! Every container in the workload runs `sh -c <fragment>`. The fragments
//! choreograph the pod-internal handshake:
//!
//! - the init fragment creates the stdio FIFOs, then idles until the file
//!   injector drops the upload sentinel into `/config`;
//! - the main fragment traps its own exit into `/termination/main` before
//!   running the child entrypoint with its streams redirected to the FIFOs;
//! - the closer wrappers turn that termination file into a shutdown signal
//!   for the sidecars, so the pod as a whole reaches a terminal state.

use crate::constants::{
    SENTINEL_POLL_SECS, STDERR_PIPE_FILE, STDIN_PIPE_FILE, STDOUT_PIPE_FILE, SUCCESS_FILE_NAME,
    TERMINATION_FILE_MAIN, WATCHDOG_POLL_SECS,
};

/// Builds the init container command.
///
/// Creates the stdout/stderr FIFOs (plus stdin when used), then polls for
/// the upload sentinel in the working directory. The init container must
/// stay *running* while files are streamed into it; seeing the sentinel is
/// its signal that injection finished and the main container may start.
pub fn init_command(uses_stdin: bool) -> String {
    let mut fragments = Vec::new();
    if uses_stdin {
        fragments.push(format!("mkfifo {STDIN_PIPE_FILE}"));
    }
    fragments.push(format!("mkfifo {STDOUT_PIPE_FILE}"));
    fragments.push(format!("mkfifo {STDERR_PIPE_FILE}"));
    fragments.push(format!(
        "until [ -f {SUCCESS_FILE_NAME} ]; do sleep {SENTINEL_POLL_SECS}; done"
    ));
    fragments.join(" && ")
}

/// Builds the main container command.
///
/// The exit trap is the primary's death certificate: sidecar watchdogs poll
/// for `/termination/main` and follow the primary down once it appears.
pub fn main_command(entrypoint: &str, args: &[String], uses_stdin: bool) -> String {
    let mut invocation = String::new();
    invocation.push_str(entrypoint);
    for arg in args {
        invocation.push(' ');
        invocation.push_str(arg);
    }
    invocation.push_str(&format!(" 2> {STDERR_PIPE_FILE} > {STDOUT_PIPE_FILE}"));

    if uses_stdin {
        invocation = format!("cat {STDIN_PIPE_FILE} | {invocation}");
    }

    format!("trap \"touch {TERMINATION_FILE_MAIN}\" EXIT\n{invocation}")
}

/// Wraps a relay sidecar command so it follows the primary's exit.
///
/// The command runs in the background while a watchdog polls for the
/// termination file once per second and kills the command when it appears.
/// The script's exit status is the termination-file test itself: zero iff
/// the primary died first, non-zero if the relay fell over on its own.
pub fn with_happy_closer(command: &str) -> String {
    format!(
        "({command}) &\n\
         CHILD_PID=$!\n\
         (while true; do if [ -f {file} ]; then kill $CHILD_PID; fi; sleep {poll}; done) &\n\
         wait $CHILD_PID\n\
         [ -f {file} ]",
        file = TERMINATION_FILE_MAIN,
        poll = WATCHDOG_POLL_SECS,
    )
}

/// Wraps the heartbeat command so its death fails the workload.
///
/// The watchdog runs in the foreground: when the termination file appears
/// the wrapper exits zero without killing the command, and if the command
/// dies first the wrapper exits one. The heartbeat loop should never stop
/// before the primary; if it did, the caller's heartbeat endpoint is gone
/// and the workload must be marked failed.
pub fn with_sad_closer(command: &str) -> String {
    format!(
        "({command}) &\n\
         CHILD_PID=$!\n\
         while true; do\n\
         if [ -f {file} ]; then exit 0; fi\n\
         if ! kill -0 $CHILD_PID 2> /dev/null; then exit 1; fi\n\
         sleep {poll}\n\
         done",
        file = TERMINATION_FILE_MAIN,
        poll = WATCHDOG_POLL_SECS,
    )
}

/// The inner heartbeat loop: GET the caller's heartbeat URL once a second,
/// aborting on the first failed request.
pub fn heartbeat_loop(heartbeat_url: &str) -> String {
    format!("set -e; while true; do curl {heartbeat_url}; sleep 1; done")
}
