//! Command/response session with the instrument
//!
//! The session is the only owner of the I/O stream. It writes one command at a time and, for queries,
//! reads back exactly one terminated line before anything else is written. There is never more than
//! one exchange in flight. Once a command starts instrument activity, nothing but the completion query
//! or the de-energize teardown may be written until the instrument reports completion.
//!
//! # Cancel Safety
//! Reading lines is cancel safe because the read buffer is only ever appended to until a full line is
//! present. The RPCs built on top are not: cancelling a query after its write but before its read leaves
//! the reply in the stream where it will be taken as the reply to the next query.

use std::io;
use tokio::io::{ AsyncWriteExt, AsyncReadExt };
use crate::{
    cmd::CmdSet,
    error::{ MeasureError, Result },
};

/// Error register value meaning no error is pending
pub const NO_ERROR: i32 = 0;

/// Line ending appended to every command written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding
{
    Lf,
    CrLf,
}

impl LineEnding
{
    pub fn as_str(&self) -> &'static str
    {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

pub struct Session<T>
{
    line_ending: LineEnding,
    io_handle: T,
    read_buf: Vec<u8>,
    executing: bool,
}

impl <T> Session<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Construct a session from an async I/O stream
    ///
    /// Opening the stream is left to the caller so any interface can carry the bus: a local serial line,
    /// a TCP/IP GPIB bridge, or an in-memory pipe for testing.
    pub fn with(io_handle: T) -> Self
    {
        Self::with_line_ending(LineEnding::Lf, io_handle)
    }

    pub fn with_line_ending(line_ending: LineEnding, io_handle: T) -> Self
    {
        Self {
            line_ending: line_ending,
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
            executing: false,
        }
    }

    /// Gives back the underlying I/O stream. Any buffered but unread bytes are lost.
    pub fn into_inner(self) -> T
    {
        self.io_handle
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            self.read_buf.drain(..n);
        }
    }

    /// Returns the index of the first linefeed in the read buffer if any, starting to look at the
    /// suggested index.
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        self.read_buf
            .get(start_hint..)
            .and_then(|rest| rest.iter().position(|byte| *byte == b'\n'))
            .map(|offset| offset + start_hint)
    }

    /// Reads a line (series of bytes terminated by `LF` / 0x0A) into the read buffer and returns how
    /// many bytes are in the line, terminator included
    ///
    /// There is no timeout. A measurement reply only arrives once the measurement finishes, which can
    /// legitimately take as long as the caller programmed it to.
    async fn read_line(&mut self) -> io::Result<usize>
    {
        let mut searched = 0;

        loop {
            if let Some(index) = self.find_line_ending(searched) {
                return Ok(index + 1);
            }

            searched = self.read_buf.len();
            let mut temp_buf = [0u8; 256];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

            if bytes_read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "instrument closed the session"));
            }

            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
        }
    }

    /// Takes a line of `size` bytes out of the read buffer with its terminator stripped
    fn take_string(&mut self, size: usize) -> io::Result<String>
    {
        let line = self.read_buf[..size].to_vec();
        self.drop_first(size);

        let mut line = String::from_utf8(line).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let trimmed_len = line.trim_end_matches(|c| c == '\r' || c == '\n').len();
        line.truncate(trimmed_len);

        Ok(line)
    }

    /// Writes a command without waiting for anything back
    ///
    /// Fails without writing if a triggered program is still running and `cmd` is neither the completion
    /// query nor part of the teardown. Disabling the channels ends an abandoned program.
    pub async fn write_cmd(&mut self, cmd: &CmdSet) -> io::Result<()>
    {
        let allowed_while_executing = matches!(
            cmd,
            CmdSet::OperationComplete | CmdSet::DeEnergize | CmdSet::DisableChannels(_)
        );

        if self.executing && !allowed_while_executing {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("`{}` written before the triggered program completed", cmd),
            ));
        }

        if cmd.triggers() {
            self.executing = true;
        }
        else if let CmdSet::DisableChannels(_) = cmd {
            // an abandoned program ends with the teardown
            self.executing = false;
        }

        let serialized = format!("{}{}", cmd, self.line_ending.as_str());
        tracing::debug!(command = %cmd, "write");
        self.io_handle.write_all(serialized.as_bytes()).await?;
        self.io_handle.flush().await
    }

    pub async fn exec_all(&mut self, cmds: &[CmdSet]) -> io::Result<()>
    {
        for cmd in cmds.iter() {
            self.write_cmd(cmd).await?;
        }

        Ok(())
    }

    /// Reads the next line the instrument sends, without writing anything first
    ///
    /// This is how a measurement's data burst is collected once the instrument reports completion.
    pub async fn read_response(&mut self) -> io::Result<String>
    {
        let response_len = self.read_line().await?;
        let response = self.take_string(response_len)?;
        tracing::debug!(bytes = response_len, "read");
        Ok(response)
    }

    /// Writes a query and reads back its one-line reply
    ///
    /// Commands which produce no reply are refused, since waiting on them would never return.
    pub async fn query(&mut self, cmd: &CmdSet) -> io::Result<String>
    {
        if !cmd.is_query() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("`{}` has no reply", cmd)));
        }

        self.write_cmd(cmd).await?;
        let reply = self.read_response().await?;
        tracing::debug!(command = %cmd, reply = %reply, "query");
        Ok(reply)
    }

    async fn query_int(&mut self, cmd: &CmdSet) -> Result<i32>
    {
        let reply = self.query(cmd).await?;

        reply.trim().parse::<i32>().map_err(|_| MeasureError::UnexpectedReply {
            query: cmd.to_string(),
            reply: reply,
        })
    }

    /// Blocks until the instrument has finished the triggered measurement program
    ///
    /// Deliberately without a timeout, like every read on the session.
    pub async fn wait_for_completion(&mut self) -> Result<()>
    {
        match self.query_int(&CmdSet::OperationComplete).await? {
            1 => {
                self.executing = false;
                Ok(())
            },
            other => Err(MeasureError::UnexpectedReply {
                query: CmdSet::OperationComplete.to_string(),
                reply: other.to_string(),
            }),
        }
    }

    /// Reads the error register and fails unless the code is in `acceptable`
    ///
    /// On failure the channels are forced to 0 V first and the instrument's own description of the code
    /// is fetched for the error. On success the accepted code is returned so callers can tell benign
    /// conditions apart from [`NO_ERROR`].
    pub async fn check_errors(&mut self, acceptable: &[i32]) -> Result<i32>
    {
        let code = self.query_int(&CmdSet::ErrorQuery).await?;

        if code == NO_ERROR || acceptable.contains(&code) {
            return Ok(code);
        }

        self.write_cmd(&CmdSet::DeEnergize).await?;

        let message = match self.query(&CmdSet::ErrorMessage(code)).await {
            Ok(message) => message.trim().trim_matches('"').to_string(),
            Err(err) => {
                tracing::warn!("Failed to fetch message for instrument error {}: {}", code, err);
                String::from("<message unavailable>")
            }
        };

        tracing::error!(code = code, "Instrument error: {}", message);
        Err(MeasureError::Instrument { code: code, message: message })
    }
}

#[cfg(test)]
mod tests
{
    use super::{ Session, LineEnding };
    use crate::{ cmd::CmdSet, error::MeasureError };
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };

    #[tokio::test]
    async fn query_round_trip()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with_line_ending(LineEnding::CrLf, client);

        instrument.write_all(b"1\r\n").await.unwrap();
        session.wait_for_completion().await.unwrap();

        let mut written = [0u8; 7];
        instrument.read_exact(&mut written).await.unwrap();
        assert_eq!(&written, b"*OPC?\r\n");
    }

    #[tokio::test]
    async fn lines_split_across_reads()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        instrument.write_all(b"NAT+0.0,NA").await.unwrap();
        instrument.write_all(b"I+1.0E-06\r\n0\r\n").await.unwrap();

        assert_eq!(session.read_response().await.unwrap(), "NAT+0.0,NAI+1.0E-06");
        assert_eq!(session.read_response().await.unwrap(), "0");
    }

    #[tokio::test]
    async fn accepted_code_is_returned()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        instrument.write_all(b"660\r\n").await.unwrap();
        assert_eq!(session.check_errors(&[660]).await.unwrap(), 660);
    }

    #[tokio::test]
    async fn rejected_code_de_energizes_and_fetches_message()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        instrument.write_all(b"305\r\n\"Excess current in HPSMU\"\r\n").await.unwrap();

        match session.check_errors(&[]).await {
            Err(MeasureError::Instrument { code, message }) => {
                assert_eq!(code, 305);
                assert_eq!(message, "Excess current in HPSMU");
            },
            other => panic!("unexpected result {:?}", other),
        }

        drop(session);
        let mut written = String::new();
        instrument.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, format!("{}\n{}\n{}\n", CmdSet::ErrorQuery, CmdSet::DeEnergize, CmdSet::ErrorMessage(305)));
    }

    #[tokio::test]
    async fn nothing_overlaps_a_triggered_program()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        session.write_cmd(&CmdSet::Execute).await.unwrap();
        let err = session.write_cmd(&CmdSet::ResetTimer).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(session.query(&CmdSet::ErrorQuery).await.is_err());

        instrument.write_all(b"1\r\n").await.unwrap();
        session.wait_for_completion().await.unwrap();
        session.write_cmd(&CmdSet::ResetTimer).await.unwrap();

        drop(session);
        let mut written = String::new();
        instrument.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "XE\n*OPC?\nTSR\n");
    }

    #[tokio::test]
    async fn teardown_allowed_while_executing()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        session.write_cmd(&CmdSet::Execute).await.unwrap();
        session.write_cmd(&CmdSet::DeEnergize).await.unwrap();
        session.write_cmd(&CmdSet::DisableChannels(Vec::new())).await.unwrap();

        drop(session);
        let mut written = String::new();
        instrument.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "XE\nDZ\nCL\n");
    }

    #[tokio::test]
    async fn teardown_ends_an_abandoned_program()
    {
        let (client, _instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        session.write_cmd(&CmdSet::Execute).await.unwrap();
        session.write_cmd(&CmdSet::DisableChannels(Vec::new())).await.unwrap();
        session.write_cmd(&CmdSet::Reset).await.unwrap();
    }

    #[tokio::test]
    async fn query_refuses_commands_without_reply()
    {
        let (client, mut instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);

        let err = session.query(&CmdSet::Reset).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

        drop(session);
        let mut written = String::new();
        instrument.read_to_string(&mut written).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn closed_session_is_an_error()
    {
        let (client, instrument) = tokio::io::duplex(256);
        let mut session = Session::with(client);
        drop(instrument);

        assert!(session.read_response().await.is_err());
    }
}
