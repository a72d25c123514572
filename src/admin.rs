//! Operator command channel.
//!
//! A dedicated OS thread blocks on stdin and hands commands to the reactor
//! over an mpsc channel; the send doubles as the wakeup that interrupts the
//! reactor's bounded poll wait.

use std::io::{BufRead, Write};
use std::thread;
use tokio::sync::mpsc;
use tracing::error;

/// Administrative actions the reactor consumes. Each is handled exactly
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Shutdown,
}

/// Spawns the operator thread. It exits after issuing `shutdown` or on
/// stdin EOF; dropping the sender lets the reactor know no more commands
/// are coming.
pub fn spawn(tx: mpsc::Sender<Command>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            print!("command>");
            let _ = std::io::stdout().flush();

            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) => {
                    error!("cannot read operator input: {e}");
                    return;
                }
            }

            match line.trim() {
                "help" => {
                    println!("commands:");
                    println!("\thelp      : print out this message");
                    println!("\tshutdown  : shut down the server");
                }
                "shutdown" => {
                    println!("Shutting down the server...");
                    let _ = tx.blocking_send(Command::Shutdown);
                    return;
                }
                "" => {}
                _ => println!("command not found. Type \"help\" for help"),
            }
        }
    })
}
