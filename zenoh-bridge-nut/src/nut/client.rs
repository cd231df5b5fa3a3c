//! Async client for the upsd network protocol.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

use super::NutError;
use super::protocol::{request, tokenize};
use crate::telemetry::{Value, Variable};

/// Longest reply line accepted from upsd, newline included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A UPS advertised by upsd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsDevice {
    pub name: String,
    pub description: String,
}

/// A single connection to upsd.
///
/// Requests are strictly sequential: each one is answered before the next
/// is sent.
pub struct NutClient {
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

impl NutClient {
    /// Open a TCP connection to `addr` (`host:port`).
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, NutError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NutError::Timeout(timeout))?
            .map_err(|source| NutError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            stream: BufReader::new(stream),
            timeout,
        })
    }

    /// Log in with `USERNAME` and `PASSWORD`.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), NutError> {
        self.expect_ok("USERNAME", &request("USERNAME", &[username]))
            .await?;
        self.expect_ok("PASSWORD", &request("PASSWORD", &[password]))
            .await
    }

    /// `LIST UPS`: every UPS served by this upsd.
    pub async fn list_ups(&mut self) -> Result<Vec<UpsDevice>, NutError> {
        let query = request("LIST", &["UPS"]);
        let rows = self.list(&query).await?;

        rows.into_iter()
            .map(|row| {
                if row.len() < 2 || row[0] != "UPS" {
                    return Err(NutError::Protocol {
                        command: query.clone(),
                        reply: row.join(" "),
                    });
                }
                let mut words = row.into_iter().skip(1);
                Ok(UpsDevice {
                    name: words.next().unwrap_or_default(),
                    description: words.next().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// `LIST VAR <ups>`: every variable of one UPS.
    pub async fn list_vars(&mut self, ups: &str) -> Result<Vec<Variable>, NutError> {
        let query = request("LIST", &["VAR", ups]);
        let rows = self.list(&query).await?;

        rows.into_iter()
            .map(|row| match row.as_slice() {
                [kind, device, name, value] if kind == "VAR" && device == ups => {
                    Ok(Variable::new(name.clone(), Value::parse(value)))
                }
                _ => Err(NutError::Protocol {
                    command: query.clone(),
                    reply: row.join(" "),
                }),
            })
            .collect()
    }

    /// End the session politely.
    pub async fn logout(&mut self) -> Result<(), NutError> {
        let reply = self.request("LOGOUT", "LOGOUT").await?;
        if reply.starts_with("OK") {
            Ok(())
        } else {
            Err(NutError::Protocol {
                command: "LOGOUT".to_string(),
                reply,
            })
        }
    }

    async fn expect_ok(&mut self, command: &str, line: &str) -> Result<(), NutError> {
        let reply = self.request(command, line).await?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(NutError::Protocol {
                command: command.to_string(),
                reply,
            })
        }
    }

    /// Send one request and read one reply line.
    ///
    /// `command` names the request in errors; `line` may carry secrets and is
    /// never logged.
    async fn request(&mut self, command: &str, line: &str) -> Result<String, NutError> {
        self.send(line).await?;
        let reply = self.read_line().await?;
        check_error(command, reply)
    }

    /// Run a `LIST` query and return the tokenized rows between
    /// `BEGIN <query>` and `END <query>`.
    async fn list(&mut self, query: &str) -> Result<Vec<Vec<String>>, NutError> {
        let expected = tokenize(query).unwrap_or_default();
        let first = self.request(query, query).await?;

        let framed = matches!(
            tokenize(&first).as_deref(),
            Some([begin, rest @ ..]) if begin == "BEGIN" && rest == expected.as_slice()
        );
        if !framed {
            return Err(NutError::Protocol {
                command: query.to_string(),
                reply: first,
            });
        }

        let mut rows = Vec::new();
        loop {
            let line = self.read_line().await?;
            let line = check_error(query, line)?;
            let words = tokenize(&line).ok_or_else(|| NutError::Protocol {
                command: query.to_string(),
                reply: line.clone(),
            })?;

            let done = matches!(
                words.as_slice(),
                [end, rest @ ..] if end == "END" && rest == expected.as_slice()
            );
            if done {
                return Ok(rows);
            }
            rows.push(words);
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), NutError> {
        let timeout = self.timeout;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let stream = self.stream.get_mut();
        with_timeout(timeout, async {
            stream.write_all(&buf).await?;
            stream.flush().await
        })
        .await
    }

    async fn read_line(&mut self) -> Result<String, NutError> {
        let timeout = self.timeout;
        let mut line = String::new();

        let mut limited = (&mut self.stream).take(MAX_LINE_LEN as u64);
        let n = with_timeout(timeout, limited.read_line(&mut line)).await?;
        if n == 0 {
            return Err(NutError::Closed);
        }
        if n >= MAX_LINE_LEN && !line.ends_with('\n') {
            return Err(NutError::LineTooLong(MAX_LINE_LEN));
        }

        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(reply = %line, "upsd reply");
        Ok(line)
    }
}

fn check_error(command: &str, reply: String) -> Result<String, NutError> {
    match reply.strip_prefix("ERR ") {
        Some(code) => Err(NutError::Server {
            command: command.to_string(),
            code: code.trim().to_string(),
        }),
        None => Ok(reply),
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, NutError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| NutError::Timeout(timeout))?
        .map_err(NutError::Io)
}
