//! In-memory B1500A stand-in
//!
//! Records every command line it is sent and answers the handful of queries the driver makes. Each `XE`
//! arms a data burst which is written right after the reply to the next `ERR?`, if that reply is one of
//! [`Script::burst_codes`].
//!
//! Bursts are sized the way the instrument sizes them: a `WV` single stair returns one reading per
//! step, a double stair returns two, and `MT` returns one per sampling point. Sampling bursts carry the
//! sampling point index (`X`) ahead of each time and current reading.

#![allow(dead_code)]

use std::collections::VecDeque;
use tokio::{
    io::{ AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream },
    task::JoinHandle,
};

pub const IDENTITY: &str = "Agilent Technologies,B1500A,0,A.06.01.2019.0327";

/// Instrument behavior for one test
#[derive(Debug, Clone)]
pub struct Script
{
    /// Replies to successive `ERR?` queries. `0` once exhausted
    pub error_codes: VecDeque<i32>,
    /// Error codes after which the pending burst is still sent
    pub burst_codes: Vec<i32>,
    /// Index of the reading whose current is replaced with the overflow marker
    pub overflow_at: Option<usize>,
    /// Send only this many readings per burst instead of the programmed count
    pub truncate_to: Option<usize>,
    /// Corrupt the second current field of every burst
    pub malformed: bool,
}

impl Default for Script
{
    fn default() -> Self
    {
        Self {
            error_codes: VecDeque::new(),
            burst_codes: vec![0, 660],
            overflow_at: None,
            truncate_to: None,
            malformed: false,
        }
    }
}

impl Script
{
    pub fn errors(mut self, codes: &[i32]) -> Self
    {
        self.error_codes = codes.iter().copied().collect();
        self
    }

    pub fn burst_codes(mut self, codes: &[i32]) -> Self
    {
        self.burst_codes = codes.to_vec();
        self
    }

    pub fn overflow_at(mut self, index: usize) -> Self
    {
        self.overflow_at = Some(index);
        self
    }

    pub fn truncate_to(mut self, points: usize) -> Self
    {
        self.truncate_to = Some(points);
        self
    }

    pub fn malformed(mut self) -> Self
    {
        self.malformed = true;
        self
    }
}

pub struct Simulator
{
    task: JoinHandle<Vec<String>>,
}

impl Simulator
{
    /// Starts the instrument and returns the driver's end of the bus
    pub fn spawn(script: Script) -> (DuplexStream, Self)
    {
        let (client, instrument) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve(instrument, script));

        (client, Self { task: task })
    }

    /// Closes the bus and returns every command received, terminators stripped
    pub async fn finish(self, client: DuplexStream) -> Vec<String>
    {
        drop(client);
        self.task.await.unwrap()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode
{
    Sweep,
    Sampling,
}

fn nth_arg(line: &str, n: usize) -> Option<usize>
{
    line.split_once(' ')?.1.split(',').nth(n)?.trim().parse().ok()
}

fn burst(mode: Mode, points: usize, execution: usize, script: &Script) -> String
{
    let count = script.truncate_to.unwrap_or(points);
    let sign = if execution % 2 == 0 { 1.0 } else { -1.0 };
    let mut fields = Vec::new();

    for index in 0..count {
        if mode == Mode::Sampling {
            fields.push(format!("NAX{:+06}", index + 1));
        }

        let time = (execution * points + index) as f64 * 0.01;
        fields.push(format!("NAT{:+.6E}", time));

        if mode == Mode::Sweep {
            fields.push(format!("NAV{:+.6E}", sign * index as f64 * 0.01));
        }

        if script.overflow_at == Some(index) {
            fields.push(String::from("CAI+199.999E+99"));
        }
        else if script.malformed && index == 1 {
            fields.push(String::from("NAI+1.2.3E-06"));
        }
        else {
            fields.push(format!("NAI{:+.6E}", sign * (index + 1) as f64 * 1e-9));
        }
    }

    format!("{}\r\n", fields.join(","))
}

async fn serve(instrument: DuplexStream, mut script: Script) -> Vec<String>
{
    let (reader, mut writer) = tokio::io::split(instrument);
    let mut lines = BufReader::new(reader).lines();
    let mut commands = Vec::new();
    let mut mode = Mode::Sweep;
    let mut points = 0;
    let mut executions = 0;
    let mut armed = false;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r').to_string();
        let mut reply = None;

        if line == "*OPC?" {
            reply = Some(String::from("1\r\n"));
        }
        else if line == "*IDN?" {
            reply = Some(format!("{}\r\n", IDENTITY));
        }
        else if line == "ERR? 1" {
            let code = script.error_codes.pop_front().unwrap_or(0);
            let mut text = format!("{}\r\n", code);

            if armed {
                armed = false;

                if script.burst_codes.contains(&code) {
                    text.push_str(&burst(mode, points, executions, &script));
                }

                executions += 1;
            }

            reply = Some(text);
        }
        else if let Some(code) = line.strip_prefix("EMG? ") {
            reply = Some(format!("\"Simulated error {}\"\r\n", code));
        }
        else if line.starts_with("MM ") {
            mode = if nth_arg(&line, 0) == Some(10) { Mode::Sampling } else { Mode::Sweep };
        }
        else if line.starts_with("WV ") {
            let steps = nth_arg(&line, 5).unwrap_or(0);
            points = if nth_arg(&line, 1) == Some(3) { 2 * steps } else { steps };
        }
        else if line.starts_with("MT ") {
            points = nth_arg(&line, 2).unwrap_or(0);
        }
        else if line == "XE" {
            armed = true;
        }

        commands.push(line);

        if let Some(reply) = reply {
            if writer.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    commands
}
