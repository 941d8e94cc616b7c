use granite_engine::RotateRequest;
use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;
use strata_stage::CancelToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Rotate,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" => Ok(Command::Rotate),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Applies commands read line by line. Returns once `quit` is seen or the
/// input ends.
pub fn serve(input: impl BufRead, rotate: &RotateRequest, quit: &CancelToken) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "operator input unreadable");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Rotate) => {
                info!("rotate requested");
                rotate.request();
            }
            Ok(Command::Quit) => {
                info!("quit requested");
                quit.cancel();
                return;
            }
            Err(e) => warn!(error = %e, "ignoring operator input"),
        }
    }
}

/// Serves stdin on a detached thread.
pub fn spawn_stdin(rotate: RotateRequest, quit: CancelToken) -> io::Result<()> {
    thread::Builder::new()
        .name("hsd-commands".into())
        .spawn(move || serve(io::stdin().lock(), &rotate, &quit))?;
    Ok(())
}
