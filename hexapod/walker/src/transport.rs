//! Line-based command sources.
//!
//! The TCP listener runs on its own thread with a single-threaded tokio
//! runtime, so the control thread never shares an executor with network I/O.

use std::io::BufRead;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::command::CommandHandler;

/// How often an idle listener checks whether the robot is shutting down.
const ABORT_POLL: Duration = Duration::from_millis(100);

pub struct TcpTransport {
    listener: std::net::TcpListener,
}

impl TcpTransport {
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("Listening for commands on {}", listener.local_addr()?);
        Ok(TcpTransport { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn spawn(self, handler: CommandHandler) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("walker-tcp".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start transport runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(async move {
                    if let Err(e) = serve(self.listener, handler).await {
                        error!("Command listener stopped: {}", e);
                    }
                });
            })
    }
}

async fn serve(listener: std::net::TcpListener, handler: CommandHandler) -> std::io::Result<()> {
    let listener = TcpListener::from_std(listener)?;

    while !handler.intent().is_aborted() {
        match tokio::time::timeout(ABORT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                info!("Command client connected from {}", peer);
                tokio::spawn(serve_client(stream, peer, handler.clone()));
            }
            Ok(Err(e)) => warn!("Failed to accept connection: {}", e),
            Err(_) => continue,
        }
    }

    debug!("Command listener shutting down");
    Ok(())
}

async fn serve_client(stream: TcpStream, peer: SocketAddr, handler: CommandHandler) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match tokio::time::timeout(ABORT_POLL, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if !handler.handle(&line) {
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                warn!("Read from {} failed: {}", peer, e);
                break;
            }
            Err(_) => {
                if handler.intent().is_aborted() {
                    break;
                }
            }
        }
    }
    info!("Command client {} disconnected", peer);
}

/// Reads commands from stdin until end of input, then asks the robot to stop.
pub fn spawn_stdin(handler: CommandHandler) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("walker-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if !handler.handle(&line) {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            info!("End of command input");
            handler.intent().request_abort();
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::gait::GaitKind;
    use crate::intent::RobotIntent;
    use servo::{DriverType, StubDriver};
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_tcp_lines_reach_intent() {
        let config = Arc::new(RobotConfig::default());
        let intent = Arc::new(RobotIntent::new(&config));
        let driver = DriverType::Stub(StubDriver::new(18)).into_shared();
        let handler = CommandHandler::new(intent.clone(), driver, config);

        let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = transport.local_addr().unwrap();
        let handle = transport.spawn(handler).unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        client.write_all(b"G2\nbogus\nX 50\n").unwrap();
        client.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while (intent.gait() != GaitKind::Wave || intent.x() != 50.0) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(intent.gait(), GaitKind::Wave);
        assert_eq!(intent.x(), 50.0);

        intent.request_abort();
        drop(client);
        handle.join().unwrap();
    }
}
