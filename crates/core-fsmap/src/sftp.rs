//! SFTP map over an external helper process.
//!
//! The helper speaks line-delimited JSON on stdin/stdout: one
//! [`Command`] per request line, one [`Response`] per reply line. All
//! traffic runs through a mutex-guarded channel, so concurrent callers
//! serialize and request/response pairing cannot interleave. Opened files
//! are transferred whole: reads materialize into a cursor, writes buffer
//! locally and flush as a single `WriteFile` when the stream drops.

use crate::map::{EntryInfo, FileOpenMode, FileSystemMap, FsError, ReadWriteSeek, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand, Stdio};
use std::sync::{Arc, Mutex};

/// Requests understood by the helper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Roots,
    Exists { path: PathBuf },
    List { path: PathBuf, recursive: bool },
    CreateDir { path: PathBuf },
    Remove { path: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    ReadFile { path: PathBuf },
    WriteFile { path: PathBuf, data: Vec<u8> },
}

/// Replies from the helper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "resp", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Bool { value: bool },
    Paths { paths: Vec<PathBuf> },
    Entries { entries: Vec<EntryInfo> },
    Data { data: Vec<u8> },
    Error { message: String },
}

#[derive(Debug)]
struct Channel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Channel {
    fn request(&mut self, command: &Command) -> Result<Response> {
        let mut line = serde_json::to_string(command)
            .map_err(|e| FsError::Protocol(format!("encode: {e}")))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .map_err(|e| FsError::HelperUnavailable(format!("write: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| FsError::HelperUnavailable(format!("flush: {e}")))?;
        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| FsError::HelperUnavailable(format!("read: {e}")))?;
        if read == 0 {
            return Err(FsError::HelperUnavailable("helper closed stdout".into()));
        }
        serde_json::from_str(&reply).map_err(|e| FsError::Protocol(format!("decode: {e}")))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Remote tree behind the helper binary.
#[derive(Debug)]
pub struct SftpMap {
    channel: Arc<Mutex<Channel>>,
}

impl SftpMap {
    /// Spawn `helper` with `args` (typically host/credentials file). Fails
    /// with `HelperUnavailable` when the binary cannot start.
    pub fn spawn(helper: &str, args: &[String]) -> Result<Self> {
        let mut child = ProcessCommand::new(helper)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FsError::HelperUnavailable(format!("{helper}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FsError::HelperUnavailable("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| FsError::HelperUnavailable("no stdout pipe".into()))?;
        Ok(Self {
            channel: Arc::new(Mutex::new(Channel {
                child,
                stdin,
                stdout,
            })),
        })
    }

    fn request(&self, command: Command) -> Result<Response> {
        let mut channel = self.channel.lock().expect("sftp channel poisoned");
        let response = channel.request(&command)?;
        if let Response::Error { message } = response {
            return Err(FsError::Protocol(message));
        }
        Ok(response)
    }
}

impl FileSystemMap for SftpMap {
    fn roots(&self) -> Vec<PathBuf> {
        match self.request(Command::Roots) {
            Ok(Response::Paths { paths }) => paths,
            _ => Vec::new(),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        matches!(
            self.request(Command::Exists {
                path: path.to_path_buf()
            }),
            Ok(Response::Bool { value: true })
        )
    }

    fn list(&self, path: &Path, recursive: bool) -> Result<Vec<EntryInfo>> {
        match self.request(Command::List {
            path: path.to_path_buf(),
            recursive,
        })? {
            Response::Entries { entries } => Ok(entries),
            other => Err(FsError::Protocol(format!("unexpected reply {other:?}"))),
        }
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.request(Command::CreateDir {
            path: path.to_path_buf(),
        })
        .map(|_| ())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.request(Command::Remove {
            path: path.to_path_buf(),
        })
        .map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.request(Command::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
        .map(|_| ())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.request(Command::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
        .map(|_| ())
    }

    fn open(&self, path: &Path, mode: FileOpenMode) -> Result<Box<dyn ReadWriteSeek>> {
        match mode {
            FileOpenMode::Read => {
                let data = match self.request(Command::ReadFile {
                    path: path.to_path_buf(),
                })? {
                    Response::Data { data } => data,
                    other => {
                        return Err(FsError::Protocol(format!("unexpected reply {other:?}")));
                    }
                };
                Ok(Box::new(Cursor::new(data)))
            }
            FileOpenMode::Write => Ok(Box::new(RemoteWriteStream {
                path: path.to_path_buf(),
                buffer: Cursor::new(Vec::new()),
                channel: self.channel.clone(),
            })),
            FileOpenMode::Append => Err(FsError::Unsupported("append over sftp helper")),
        }
    }
}

/// Buffers writes locally; the whole buffer flushes as one `WriteFile`
/// on drop.
struct RemoteWriteStream {
    path: PathBuf,
    buffer: Cursor<Vec<u8>>,
    channel: Arc<Mutex<Channel>>,
}

impl Read for RemoteWriteStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Write for RemoteWriteStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for RemoteWriteStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Drop for RemoteWriteStream {
    fn drop(&mut self) {
        let command = Command::WriteFile {
            path: self.path.clone(),
            data: self.buffer.get_ref().clone(),
        };
        if let Ok(mut channel) = self.channel.lock() {
            if let Err(e) = channel.request(&command) {
                tracing::warn!(target: "fsmap.sftp", path = %self.path.display(), error = %e, "remote write lost");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_round_trips_as_json_lines() {
        let commands = [
            Command::Roots,
            Command::List {
                path: PathBuf::from("/remote/data"),
                recursive: true,
            },
            Command::WriteFile {
                path: PathBuf::from("/remote/out.bin"),
                data: vec![0, 1, 255],
            },
        ];
        for c in commands {
            let line = serde_json::to_string(&c).unwrap();
            assert!(!line.contains('\n'), "one line per message");
            let back: Command = serde_json::from_str(&line).unwrap();
            assert_eq!(back, c);
        }
        let responses = [
            Response::Ok,
            Response::Bool { value: true },
            Response::Entries {
                entries: vec![EntryInfo {
                    path: PathBuf::from("/remote/a"),
                    is_dir: true,
                    size: 0,
                }],
            },
            Response::Error {
                message: "denied".into(),
            },
        ];
        for r in responses {
            let line = serde_json::to_string(&r).unwrap();
            let back: Response = serde_json::from_str(&line).unwrap();
            assert_eq!(back, r);
        }
    }

    #[test]
    fn missing_helper_reports_unavailable() {
        let err = SftpMap::spawn("definitely-not-a-real-helper-binary", &[]).unwrap_err();
        assert!(matches!(err, FsError::HelperUnavailable(_)));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        // A helper that always answers with an error reply.
        let script = r#"while read -r _line; do echo '{"resp":"error","message":"denied"}'; done"#;
        let map = match SftpMap::spawn("sh", &["-c".to_string(), script.to_string()]) {
            Ok(m) => m,
            Err(_) => return, // no shell on this platform; nothing to test
        };
        let err = map.list(Path::new("/x"), false).unwrap_err();
        assert!(matches!(err, FsError::Protocol(m) if m == "denied"));
    }
}
