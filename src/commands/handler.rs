//! Command Handler Module
//!
//! This module implements the file commands of FlashFTP. Each command reads
//! a JSON request from the frame payload, runs against the session's view of
//! the filesystem, and queues one JSON reply of the same message type.
//!
//! ## Supported Commands
//!
//! - `HELLO data` - Echo a greeting
//! - `LIST [path]` - List a directory
//! - `MKDIR path` - Create a directory and its parents
//! - `RMDIR path` - Remove a directory tree
//! - `UPLOAD path content [compress original_size]` - Write a file
//! - `DOWNLOAD path [compress]` - Read a file as base64
//! - `CD path` - Change the working directory
//! - `PWD` - Print the working directory
//! - `CAT path` - Read a file as text
//! - `EXIT` - Say goodbye and close the connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  handle()   │───>│  execute()  │───>│ dispatch()  │      │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘      │
//! │         │ reply                               │             │
//! │         ▼                                     ▼             │
//! │     SendQueue                             FileSystem        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure becomes a reply whose `data` starts with
//! `Exception occurred: `; the connection stays open.

use crate::compress::{self, CompressError};
use crate::connection::{CloseReason, Session};
use crate::dispatch::HandlerRegistry;
use crate::fs::FileSystem;
use crate::protocol::{FrameError, Message, MessageType, Request, Response};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reply to EXIT.
pub const GOODBYE: &str = "Thank you for using FlashFTP, goodbye!";

/// Errors raised while executing a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("invalid request: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("invalid content: {0}")]
    InvalidContent(#[from] base64::DecodeError),

    #[error(transparent)]
    Decompress(#[from] CompressError),

    #[error("Directory does not exist: {0}")]
    NotADirectory(String),

    #[error("{0}")]
    Refused(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Executes file commands on behalf of sessions.
#[derive(Clone)]
pub struct CommandHandler {
    /// Filesystem all paths are resolved against
    fs: Arc<dyn FileSystem>,
}

impl CommandHandler {
    /// Creates a new command handler over the given filesystem.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Registers a handler for every message type in the catalog.
    pub fn register_all(self: &Arc<Self>, registry: &mut HandlerRegistry) {
        for kind in MessageType::ALL {
            let handler = Arc::clone(self);
            registry.register(kind, move |session: &Arc<Session>, message: &Message| {
                handler.handle(session, message)
            });
        }
        info!(commands = MessageType::ALL.len(), "Registered file commands");
    }

    /// Executes `message` and queues the reply on `session`.
    ///
    /// An EXIT additionally asks the session to close once the reply has
    /// been written.
    pub fn handle(&self, session: &Arc<Session>, message: &Message) -> anyhow::Result<()> {
        let response = self.execute(session, message);
        self.reply(session, message.msg_type, &response)?;

        if message.kind() == Some(MessageType::Exit) {
            session.close_after_flush(CloseReason::ExplicitClose);
        }
        Ok(())
    }

    /// Executes a command and returns the reply.
    pub fn execute(&self, session: &Session, message: &Message) -> Response {
        let Some(kind) = message.kind() else {
            return Response::error(message.msg_type, "unknown message type");
        };

        match self.dispatch(kind, session, &message.payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(session = %session.id(), command = %kind, error = %e, "Command failed");
                Response::error(message.msg_type, e)
            }
        }
    }

    /// Dispatches a command to its handler.
    fn dispatch(
        &self,
        kind: MessageType,
        session: &Session,
        payload: &[u8],
    ) -> Result<Response, CommandError> {
        match kind {
            MessageType::Hello => self.cmd_hello(&Request::from_slice(payload)?),
            MessageType::Mkdir => self.cmd_mkdir(session, &Request::from_slice(payload)?),
            MessageType::Rmdir => self.cmd_rmdir(session, &Request::from_slice(payload)?),
            MessageType::List => self.cmd_list(session, &Request::from_slice(payload)?),
            MessageType::Upload => self.cmd_upload(session, &Request::from_slice(payload)?),
            MessageType::Download => self.cmd_download(session, &Request::from_slice(payload)?),
            MessageType::Cd => self.cmd_cd(session, &Request::from_slice(payload)?),
            MessageType::Pwd => Ok(self.cmd_pwd(session)),
            MessageType::Cat => self.cmd_cat(session, &Request::from_slice(payload)?),
            MessageType::Exit => Ok(self.cmd_exit(session)),
        }
    }

    /// Serializes and queues a reply.
    ///
    /// A reply too large for one frame is replaced by an error reply.
    fn reply(&self, session: &Session, msg_type: u16, response: &Response) -> Result<(), CommandError> {
        let body = response.to_vec()?;
        match session.send(msg_type, &body) {
            Ok(outcome) => {
                debug!(session = %session.id(), msg_type, bytes = body.len(), ?outcome, "Reply queued");
                Ok(())
            }
            Err(e @ FrameError::FrameTooLarge { .. }) => {
                warn!(session = %session.id(), msg_type, error = %e, "Reply too large");
                let fallback = Response::error(msg_type, CommandError::Frame(e)).to_vec()?;
                session.send(msg_type, &fallback)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves the request's path against the session's working directory.
    fn resolve(&self, session: &Session, request: &Request) -> String {
        self.fs
            .resolve(&session.cwd(), request.path.as_deref().unwrap_or(""))
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// HELLO data
    fn cmd_hello(&self, request: &Request) -> Result<Response, CommandError> {
        let data = request.data.as_deref().unwrap_or("");
        Ok(Response::data(
            MessageType::Hello,
            format!("server has received msg, msg data is {}", data),
        ))
    }

    /// MKDIR path
    fn cmd_mkdir(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        let created = self.fs.mkdir(&path)?;
        Ok(Response::data(
            MessageType::Mkdir,
            if created {
                "Directory created successfully"
            } else {
                "Failed to create directory"
            },
        ))
    }

    /// RMDIR path
    fn cmd_rmdir(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        if path == "/" {
            return Err(CommandError::Refused(
                "refusing to remove the root directory".to_string(),
            ));
        }

        let removed = self.fs.rmdir(&path)?;
        Ok(Response::data(
            MessageType::Rmdir,
            if removed {
                "Directory removed successfully"
            } else {
                "Failed to remove directory"
            },
        ))
    }

    /// LIST [path]
    fn cmd_list(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        let listing = self.fs.list(&path)?;
        Ok(Response::data(MessageType::List, listing))
    }

    /// UPLOAD path content [compress original_size]
    fn cmd_upload(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        let raw = compress::decode_base64(request.content.as_deref().unwrap_or(""))?;
        let content = if request.compress {
            compress::decompress(&raw, request.original_size)?
        } else {
            raw
        };

        self.fs.write_file(&path, &content)?;
        info!(session = %session.id(), path = %path, bytes = content.len(), "File uploaded");
        Ok(Response::data(MessageType::Upload, "File uploaded successfully"))
    }

    /// DOWNLOAD path [compress]
    fn cmd_download(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        let content = self.fs.read_file(&path)?;

        let (encoded, compressed) = if request.compress {
            match compress::compress(&content) {
                Ok(packed) => (compress::encode_base64(&packed), true),
                Err(e) => {
                    warn!(session = %session.id(), error = %e, "Compression failed, sending raw");
                    (compress::encode_base64(&content), false)
                }
            }
        } else {
            (compress::encode_base64(&content), false)
        };

        info!(session = %session.id(), path = %path, bytes = content.len(), compressed, "File downloaded");
        Ok(Response {
            compress: Some(compressed),
            original_size: Some(content.len() as u64),
            ..Response::content(MessageType::Download, encoded)
        })
    }

    /// CD path
    fn cmd_cd(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        if !self.fs.is_dir(&path) {
            return Err(CommandError::NotADirectory(path));
        }

        session.set_cwd(path.clone());
        Ok(Response::data(
            MessageType::Cd,
            format!("Changed directory to {}", path),
        ))
    }

    /// PWD
    fn cmd_pwd(&self, session: &Session) -> Response {
        Response::data(MessageType::Pwd, session.cwd())
    }

    /// CAT path
    fn cmd_cat(&self, session: &Session, request: &Request) -> Result<Response, CommandError> {
        let path = self.resolve(session, request);
        let content = self.fs.read_file(&path)?;
        Ok(Response::content(
            MessageType::Cat,
            String::from_utf8_lossy(&content),
        ))
    }

    /// EXIT
    fn cmd_exit(&self, session: &Session) -> Response {
        info!(session = %session.id(), "Client requested exit");
        Response::data(MessageType::Exit, GOODBYE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionSettings;
    use crate::fs::LocalFs;
    use crate::protocol::{FrameDecoder, ERROR_PREFIX};
    use tempfile::TempDir;

    fn create_handler() -> (TempDir, CommandHandler, Arc<Session>) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(LocalFs::new(dir.path(), "/"));
        let handler = CommandHandler::new(fs);
        let session = Session::detached(&SessionSettings::default());
        (dir, handler, session)
    }

    fn make_message(request: &Request) -> Message {
        Message::new(request.msg_id, request.to_vec().unwrap())
    }

    fn run(handler: &CommandHandler, session: &Session, request: Request) -> Response {
        handler.execute(session, &make_message(&request))
    }

    /// Decodes every reply queued on a detached session.
    fn queued_replies(session: &Session) -> Vec<(u16, Response)> {
        let mut decoder = FrameDecoder::new();
        session
            .send_queue()
            .snapshot()
            .iter()
            .flat_map(|frame| decoder.feed(frame).unwrap())
            .map(|m| (m.msg_type, Response::from_slice(&m.payload).unwrap()))
            .collect()
    }

    #[test]
    fn test_hello() {
        let (_dir, handler, session) = create_handler();
        let response = run(
            &handler,
            &session,
            Request::new(MessageType::Hello).with_data("hi there"),
        );
        assert_eq!(response.msg_id, 1001);
        assert_eq!(
            response.data.as_deref(),
            Some("server has received msg, msg data is hi there")
        );
    }

    #[test]
    fn test_mkdir_twice() {
        let (dir, handler, session) = create_handler();
        let request = Request::new(MessageType::Mkdir).with_path("a/b");

        let first = run(&handler, &session, request.clone());
        assert_eq!(first.data.as_deref(), Some("Directory created successfully"));
        assert!(dir.path().join("a/b").is_dir());

        let second = run(&handler, &session, request);
        assert_eq!(second.data.as_deref(), Some("Failed to create directory"));
        assert!(!second.is_error());
    }

    #[test]
    fn test_rmdir() {
        let (dir, handler, session) = create_handler();
        std::fs::create_dir_all(dir.path().join("gone/inner")).unwrap();

        let response = run(&handler, &session, Request::new(MessageType::Rmdir).with_path("/gone"));
        assert_eq!(response.data.as_deref(), Some("Directory removed successfully"));
        assert!(!dir.path().join("gone").exists());

        let response = run(&handler, &session, Request::new(MessageType::Rmdir).with_path("/gone"));
        assert_eq!(response.data.as_deref(), Some("Failed to remove directory"));
    }

    #[test]
    fn test_rmdir_root_refused() {
        let (dir, handler, session) = create_handler();
        let response = run(&handler, &session, Request::new(MessageType::Rmdir).with_path("../.."));
        assert!(response.is_error());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_cd_pwd() {
        let (dir, handler, session) = create_handler();
        std::fs::create_dir(dir.path().join("docs")).unwrap();

        let response = run(&handler, &session, Request::new(MessageType::Cd).with_path("docs"));
        assert_eq!(response.data.as_deref(), Some("Changed directory to /docs"));

        let response = run(&handler, &session, Request::new(MessageType::Pwd));
        assert_eq!(response.data.as_deref(), Some("/docs"));

        let response = run(&handler, &session, Request::new(MessageType::Cd).with_path("missing"));
        assert!(response.is_error());
        assert_eq!(session.cwd(), "/docs");
    }

    #[test]
    fn test_upload_download_cat() {
        let (dir, handler, session) = create_handler();
        let text = b"line one\nline two\n".repeat(20);
        let packed = compress::compress(&text).unwrap();

        let upload = Request::new(MessageType::Upload)
            .with_path("notes.txt")
            .with_content(compress::encode_base64(&packed), true, text.len() as u64);
        let response = run(&handler, &session, upload);
        assert_eq!(response.data.as_deref(), Some("File uploaded successfully"));
        assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), text);

        let response = run(
            &handler,
            &session,
            Request::new(MessageType::Download).with_path("notes.txt"),
        );
        assert_eq!(response.compress, Some(false));
        assert_eq!(response.original_size, Some(text.len() as u64));
        let raw = compress::decode_base64(response.content.as_deref().unwrap()).unwrap();
        assert_eq!(raw, text);

        let response = run(
            &handler,
            &session,
            Request::new(MessageType::Download).with_path("/notes.txt").compressed(),
        );
        assert_eq!(response.compress, Some(true));
        let raw = compress::decode_base64(response.content.as_deref().unwrap()).unwrap();
        assert_eq!(compress::decompress(&raw, text.len() as u64).unwrap(), text);

        let response = run(&handler, &session, Request::new(MessageType::Cat).with_path("notes.txt"));
        assert_eq!(response.content.as_deref().map(str::as_bytes), Some(&text[..]));
    }

    #[test]
    fn test_upload_bad_content() {
        let (_dir, handler, session) = create_handler();

        let response = run(
            &handler,
            &session,
            Request::new(MessageType::Upload).with_content("!!!", false, 0),
        );
        assert!(response.data.unwrap().starts_with(ERROR_PREFIX));

        let response = run(
            &handler,
            &session,
            Request::new(MessageType::Upload)
                .with_path("x")
                .with_content(compress::encode_base64(b"not zlib"), true, 8),
        );
        assert!(response.is_error());
    }

    #[test]
    fn test_missing_file_is_error() {
        let (_dir, handler, session) = create_handler();
        let response = run(&handler, &session, Request::new(MessageType::Cat).with_path("nope"));
        assert_eq!(response.msg_id, MessageType::Cat.as_u16());
        assert!(response.is_error());
    }

    #[test]
    fn test_invalid_json() {
        let (_dir, handler, session) = create_handler();
        let response = handler.execute(&session, &Message::new(MessageType::List, "not json"));
        assert_eq!(response.msg_id, 1004);
        assert!(response.is_error());
    }

    #[test]
    fn test_list() {
        let (dir, handler, session) = create_handler();
        std::fs::write(dir.path().join("file.txt"), b"12345").unwrap();

        let response = run(&handler, &session, Request::new(MessageType::List));
        let listing = response.data.unwrap();
        assert!(listing.starts_with("Listing directory: /\n"));
        assert!(listing.contains("file.txt"));
        assert!(listing.contains("5.00 B"));
    }

    #[test]
    fn test_handle_queues_reply() {
        let (_dir, handler, session) = create_handler();
        handler
            .handle(&session, &make_message(&Request::new(MessageType::Pwd)))
            .unwrap();

        let replies = queued_replies(&session);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, 1008);
        assert_eq!(replies[0].1.data.as_deref(), Some("/"));
        assert_eq!(session.close_requested(), None);
    }

    #[test]
    fn test_exit_requests_close_after_reply() {
        let (_dir, handler, session) = create_handler();
        handler
            .handle(&session, &Message::new(MessageType::Exit, ""))
            .unwrap();

        let replies = queued_replies(&session);
        assert_eq!(replies[0].1.data.as_deref(), Some(GOODBYE));
        assert_eq!(session.close_requested(), Some(CloseReason::ExplicitClose));
    }

    #[test]
    fn test_oversized_reply_becomes_error() {
        let (dir, handler, session) = create_handler();
        // Base64 grows 60000 bytes past the 16-bit length field
        let blob = vec![b'x'; 60_000];
        std::fs::write(dir.path().join("big.bin"), &blob).unwrap();

        handler
            .handle(
                &session,
                &make_message(&Request::new(MessageType::Download).with_path("big.bin")),
            )
            .unwrap();

        let replies = queued_replies(&session);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].1.is_error());
        assert!(replies[0].1.data.as_deref().unwrap().contains("frame too large"));
    }

    #[test]
    fn test_register_all() {
        let (dir, _, _) = create_handler();
        let handler = Arc::new(CommandHandler::new(Arc::new(LocalFs::new(dir.path(), "/"))));
        let mut registry = HandlerRegistry::new();
        handler.register_all(&mut registry);
        assert_eq!(registry.types(), (1001..=1010).collect::<Vec<u16>>());
    }
}
