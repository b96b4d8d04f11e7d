//! Device definition and APIs
//!
//! # Purpose
//! This module defines handles to an active I/O stream which provide high-level RPCs for:
//!   - Mapping instrument module slots onto channel numbers
//!   - Running staircase sweeps and time-domain sampling measurements
//!   - Inquiring about the identity of the device
//!
//! # Cancel Safety
//! **None of the device RPCs are cancel safe,** i.e. they should not be used in a `tokio::select!`
//! call. Each RPC has both writes and reads, so cancelling after a write but before a read will result in
//! a misalignment with the data stream: the reply to the first query will be interpreted as the reply to
//! any subsequent one.
//!
//! The measurement RPCs are _extremely_ non-cancel safe. They are long chains of commands, and a
//! measurement cancelled halfway leaves the channels under bias because the teardown never runs. If a
//! watchdog is needed, put it around the whole process rather than around a single RPC.
//!
//! # Supported Devices
//! All supported devices have a struct in this module named closely to a camel-case version of the
//! brand and model number. Currently supported devices are:
//!   - Keysight B1500A (and the B1500 family speaking the same FLEX command set)

use tokio::io::{ AsyncWriteExt, AsyncReadExt };
use crate::{
    cmd::CmdSet,
    error::Result,
    measure::{ SweepMeasurement, SamplingMeasurement, SweepData, SampleData },
    session::{ Session, LineEnding },
    spec::{ ChannelConfig, SweepSpec, SampleSpec },
};

/// A connected Keysight B1500A semiconductor device analyzer
pub struct B1500a<T>
{
    session: Session<T>,
}

impl <T> B1500a<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Construct a new device handle from an async I/O stream
    ///
    /// Creating I/O handles is not handled by this library so that you are not restricted to connecting to
    /// the device via a particular hardware interface. For instance, it may be desirable to use a TCP/IP
    /// GPIB bridge so that the device can be controlled over the network instead of a local serial line.
    pub fn with(io_handle: T) -> Self
    {
        Self::with_line_ending(LineEnding::CrLf, io_handle)
    }

    pub fn with_line_ending(line_ending: LineEnding, io_handle: T) -> Self
    {
        Self {
            session: Session::with_line_ending(line_ending, io_handle),
        }
    }

    /// Direct access to the command session for anything this handle doesn't wrap
    pub fn session(&mut self) -> &mut Session<T>
    {
        &mut self.session
    }

    pub fn into_inner(self) -> T
    {
        self.session.into_inner()
    }

    /// Queries the identification string, e.g. `Agilent Technologies,B1500A,0,A.06.01.2019.0327`
    pub async fn identify(&mut self) -> Result<String>
    {
        let id = self.session.query(&CmdSet::Identify).await?;
        Ok(id.trim().to_string())
    }

    /// Maps the module in `slot` onto channel number `channel` and waits for the mapping to apply
    pub async fn assign_channel(&mut self, channel: u8, slot: u8) -> Result<()>
    {
        self.session.write_cmd(&CmdSet::AssignChannel { channel: channel, slot: slot }).await?;
        self.session.wait_for_completion().await
    }

    /// Applies every `(channel, slot)` mapping in order
    pub async fn assign_channels(&mut self, assignments: &[(u8, u8)]) -> Result<()>
    {
        for (channel, slot) in assignments.iter() {
            self.assign_channel(*channel, *slot).await?;
        }

        Ok(())
    }

    /// Runs a bidirectional staircase sweep
    ///
    /// See [`SweepMeasurement::run`].
    pub async fn run_sweep(&mut self, channels: &ChannelConfig, spec: &SweepSpec) -> Result<SweepData>
    {
        SweepMeasurement::run(&mut self.session, channels, spec).await
    }

    /// Runs a sampling measurement
    ///
    /// See [`SamplingMeasurement::run`].
    pub async fn run_sample(&mut self, channels: &ChannelConfig, spec: &SampleSpec) -> Result<SampleData>
    {
        SamplingMeasurement::run(&mut self.session, channels, spec).await
    }

    /// Runs a sampling measurement which stops itself once the force channel reaches compliance
    ///
    /// Same as [`B1500a::run_sample`] with auto-abort on compliance forced on, which is what forming a
    /// device calls for.
    pub async fn run_forming(&mut self, channels: &ChannelConfig, spec: &SampleSpec) -> Result<SampleData>
    {
        let spec = spec.clone().auto_abort_on_compliance(true);
        SamplingMeasurement::run(&mut self.session, channels, &spec).await
    }
}
