//! Measurement programs
//!
//! A measurement walks an explicit state machine:
//!
//! ```text
//! Idle → Configuring → Armed → Executing → Synchronized → Parsed
//!            │            ▲                                  │
//!            │            └──────── next sweep pass ─────────┘
//!            └──────────── any failure ──────────→ Aborted
//! ```
//!
//! The channels are energized from the moment configuration starts until the [`Energized`] scope is
//! released, which forces every channel to 0 V and opens every output switch exactly once no matter
//! how the measurement ended.

use std::io;
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use tracing::Instrument;
use crate::{
    cmd::{ CmdSet, OutputFormat, OutputMode, AveragingMode, MeasureMode, MeasureSide, SweepShape, Adc, IntegrationMode },
    error::Result,
    response::{ self, Kind, Readings },
    session::Session,
    spec::{ ChannelConfig, SweepSpec, SweepParams, SampleSpec, SampleParams },
    units::{ Volt, Second },
};

/// Error code the instrument raises when a sampling measurement stopped itself on compliance
pub const AUTO_ABORT_ERROR_CODE: i32 = 660;

/// Readings averaged per sweep step
pub const AVERAGING_SAMPLES: u16 = 30;

/// High-resolution ADC integration time, in multiples of the power line cycle
pub const INTEGRATION_COEFFICIENT: u16 = 3;

/// Each sweep pass is a single stair from the start voltage to its turning point
pub const SWEEP_SHAPE: SweepShape = SweepShape::LinearSingle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementState
{
    /// Nothing has been written yet
    Idle,
    /// Channels are enabled and the program is being written
    Configuring,
    /// The program passed its error check and is ready to trigger
    Armed,
    /// Triggered, waiting on the instrument
    Executing,
    /// The instrument reported completion
    Synchronized,
    /// The reply burst was decoded
    Parsed,
    /// Torn down after a failure
    Aborted,
}

impl MeasurementState
{
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(self, next: Self) -> bool
    {
        use MeasurementState::*;

        match (self, next) {
            (Idle, Configuring) => true,
            (Configuring, Armed) => true,
            (Armed, Executing) => true,
            (Executing, Synchronized) => true,
            (Synchronized, Parsed) => true,
            (Parsed, Armed) => true,
            (Parsed, _) | (Aborted, _) => false,
            (_, Aborted) => true,
            _ => false,
        }
    }
}

/// Scope during which the measurement channels may be under bias
///
/// The only way out is [`Energized::release`], which writes the teardown. Dropping the scope without
/// releasing it cannot write anything since there is no async drop, so it is logged as an error.
pub struct Energized<'s, T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    session: &'s mut Session<T>,
    state: MeasurementState,
    released: bool,
}

impl <'s, T> Energized<'s, T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    pub fn begin(session: &'s mut Session<T>) -> Self
    {
        let mut energized = Self {
            session: session,
            state: MeasurementState::Idle,
            released: false,
        };

        energized.advance(MeasurementState::Configuring);
        energized
    }

    pub fn session(&mut self) -> &mut Session<T>
    {
        &mut *self.session
    }

    /// Moves the state machine along
    ///
    /// An illegal transition is a bug in the measurement program, not an instrument condition.
    pub fn advance(&mut self, next: MeasurementState)
    {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal measurement transition {:?} -> {:?}", self.state, next
        );
        tracing::trace!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    async fn tear_down(&mut self) -> io::Result<()>
    {
        self.session.write_cmd(&CmdSet::DeEnergize).await?;
        self.session.write_cmd(&CmdSet::DisableChannels(Vec::new())).await
    }

    /// Forces every channel to 0 V, opens every output switch and hands back `outcome`
    ///
    /// If the measurement already failed its error is returned even when the teardown fails too. If it
    /// succeeded but the teardown did not, the teardown error is returned instead of the data.
    pub async fn release<R>(mut self, outcome: Result<R>) -> Result<R>
    {
        if outcome.is_err() {
            self.advance(MeasurementState::Aborted);
        }

        self.released = true;
        let teardown = self.tear_down().await;

        match (outcome, teardown) {
            (Err(err), Err(teardown_err)) => {
                tracing::error!("Failed to de-energize channels after an aborted measurement: {}", teardown_err);
                Err(err)
            },
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(teardown_err)) => Err(teardown_err.into()),
            (Ok(data), Ok(())) => Ok(data),
        }
    }
}

impl <'s, T> Drop for Energized<'s, T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    fn drop(&mut self)
    {
        if !self.released {
            tracing::error!(state = ?self.state, "Measurement scope dropped without de-energizing channels");
        }
    }
}

/// Writes the commands common to every measurement program: reset, channel enable, data format
async fn configure_common<T>(session: &mut Session<T>, channels: &ChannelConfig) -> io::Result<()>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    session.exec_all(&[
        CmdSet::Reset,
        CmdSet::EnableChannels(channels.channels()),
        CmdSet::Format(OutputFormat::AsciiHeadered, OutputMode::PrimarySweep),
        CmdSet::Timestamp(true),
    ]).await
}

/// Triggers the armed program, waits for it and reads back its burst
///
/// Returns the code accepted by the post-execution error check along with the decoded burst.
async fn execute<T>(energized: &mut Energized<'_, T>, reset_timer: bool, acceptable: &[i32]) -> Result<(i32, Readings)>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    if reset_timer {
        energized.session().write_cmd(&CmdSet::ResetTimer).await?;
    }

    energized.session().write_cmd(&CmdSet::Execute).await?;
    energized.advance(MeasurementState::Executing);

    energized.session().wait_for_completion().await?;
    energized.advance(MeasurementState::Synchronized);

    let code = energized.session().check_errors(acceptable).await?;
    let raw = energized.session().read_response().await?;
    let readings = response::parse(&raw)?;

    Ok((code, readings))
}

/// Series returned by a bidirectional sweep, positive pass first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepData
{
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

impl SweepData
{
    pub fn len(&self) -> usize
    {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.time.is_empty()
    }

    /// Writes the series as CSV with a header row
    pub fn write_csv<W: io::Write>(&self, mut out: W) -> io::Result<()>
    {
        writeln!(out, "t (s),V (V),I (A)")?;

        for ((time, voltage), current) in self.time.iter().zip(self.voltage.iter()).zip(self.current.iter()) {
            writeln!(out, "{},{},{}", time, voltage, current)?;
        }

        Ok(())
    }
}

impl From<Readings> for SweepData
{
    fn from(readings: Readings) -> Self
    {
        Self {
            time: readings.time,
            voltage: readings.voltage,
            current: readings.current,
        }
    }
}

/// Bidirectional staircase sweep
pub struct SweepMeasurement;

impl SweepMeasurement
{
    /// Runs `start → end` then `start → -end` on the force channel and returns the passes concatenated
    ///
    /// Fails without writing anything if `channels` or `spec` are invalid. Once anything was written the
    /// channels are always de-energized and disabled before this returns.
    pub async fn run<T>(session: &mut Session<T>, channels: &ChannelConfig, spec: &SweepSpec) -> Result<SweepData>
        where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
    {
        channels.validate()?;
        let params = spec.validate()?;
        let span = tracing::info_span!("sweep", force = channels.force, common = channels.common);

        async move {
            tracing::info!(
                "Sweeping {} to ±{} in {} points, step delay {:.6}",
                params.start.display_base(), params.end.display_base(), params.points, params.delay.display_base()
            );

            let mut energized = Energized::begin(session);
            let outcome = Self::program(&mut energized, channels, &params).await;
            let data = energized.release(outcome).await?;

            tracing::info!(samples = data.len(), "Sweep complete");
            Ok(data)
        }
        .instrument(span)
        .await
    }

    async fn program<T>(energized: &mut Energized<'_, T>, channels: &ChannelConfig, params: &SweepParams) -> Result<SweepData>
        where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
    {
        let session = energized.session();
        configure_common(session, channels).await?;
        session.exec_all(&[
            CmdSet::Averaging { samples: AVERAGING_SAMPLES, mode: AveragingMode::Manual },
            CmdSet::Filter(false),
            CmdSet::ForceVoltage { channel: channels.force, voltage: Volt::zero(), compliance: channels.compliance },
            CmdSet::ForceVoltage { channel: channels.common, voltage: Volt::zero(), compliance: channels.compliance },
            CmdSet::MeasurementMode { mode: MeasureMode::StaircaseSweep, channel: channels.force },
            CmdSet::MeasureSide { channel: channels.force, side: MeasureSide::Current },
            CmdSet::CurrentRange { channel: channels.force },
            CmdSet::SweepTiming { hold: Second::zero(), delay: params.delay },
            CmdSet::SweepAutoAbort(false),
        ]).await?;
        session.check_errors(&[]).await?;

        let mut readings = Readings::new();
        let expected = SWEEP_SHAPE.steps(params.points);

        for (pass, stop) in [params.end, -params.end].into_iter().enumerate() {
            energized.advance(MeasurementState::Armed);
            energized.session().write_cmd(&CmdSet::SweepVoltage {
                channel: channels.force,
                shape: SWEEP_SHAPE,
                start: params.start,
                stop: stop,
                points: params.points,
                compliance: params.compliance,
            }).await?;

            // the timestamp keeps counting through the second pass
            let (_, pass_readings) = execute(energized, pass == 0, &[]).await?;
            pass_readings.expect_lengths(&[Kind::Time, Kind::Voltage, Kind::Current], Some(expected))?;
            tracing::debug!(pass = pass, stop = %stop.display_base(), samples = expected, "Pass complete");

            readings.append(pass_readings);
            energized.advance(MeasurementState::Parsed);
        }

        Ok(SweepData::from(readings))
    }
}

/// Series returned by a sampling measurement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleData
{
    pub time: Vec<f64>,
    pub current: Vec<f64>,
    /// The instrument stopped early because the force channel reached compliance
    pub compliance_abort: bool,
}

impl SampleData
{
    pub fn len(&self) -> usize
    {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.time.is_empty()
    }

    /// Writes the series as CSV with a header row
    pub fn write_csv<W: io::Write>(&self, mut out: W) -> io::Result<()>
    {
        writeln!(out, "t (s),I (A)")?;

        for (time, current) in self.time.iter().zip(self.current.iter()) {
            writeln!(out, "{},{}", time, current)?;
        }

        Ok(())
    }
}

/// Fixed-interval current sampling at constant bias
pub struct SamplingMeasurement;

impl SamplingMeasurement
{
    /// Samples the force channel current `points` times, `timestep` apart, at the programmed bias
    ///
    /// With auto-abort requested, the instrument stopping on compliance is reported through
    /// [`SampleData::compliance_abort`] rather than as an error and the series may be shorter than
    /// programmed. The same code without auto-abort requested is an error.
    pub async fn run<T>(session: &mut Session<T>, channels: &ChannelConfig, spec: &SampleSpec) -> Result<SampleData>
        where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
    {
        channels.validate()?;
        let params = spec.validate()?;
        let span = tracing::info_span!("sample", force = channels.force, common = channels.common);

        async move {
            tracing::info!(
                "Sampling at {} every {:.6} for {} points, auto-abort {}",
                params.bias.display_base(), params.timestep.display_base(), params.points, params.auto_abort
            );

            let mut energized = Energized::begin(session);
            let outcome = Self::program(&mut energized, channels, &params).await;
            let data = energized.release(outcome).await?;

            tracing::info!(samples = data.len(), compliance_abort = data.compliance_abort, "Sampling complete");
            Ok(data)
        }
        .instrument(span)
        .await
    }

    async fn program<T>(energized: &mut Energized<'_, T>, channels: &ChannelConfig, params: &SampleParams) -> Result<SampleData>
        where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
    {
        let session = energized.session();
        configure_common(session, channels).await?;
        session.exec_all(&[
            CmdSet::Filter(true),
            CmdSet::AdcType { channel: channels.force, adc: Adc::HighResolution },
            CmdSet::AdcType { channel: channels.common, adc: Adc::HighResolution },
            CmdSet::AdcIntegration { adc: Adc::HighResolution, mode: IntegrationMode::Manual, coefficient: INTEGRATION_COEFFICIENT },
            CmdSet::AdcAutoZero(false),
            CmdSet::SamplingTiming {
                base_hold: Second::zero(),
                interval: params.timestep,
                points: params.points,
                base_time: Second::zero(),
            },
            CmdSet::SamplingVoltage {
                channel: channels.force,
                base: Volt::zero(),
                bias: params.bias,
                compliance: params.compliance,
            },
            CmdSet::ForceVoltage { channel: channels.common, voltage: Volt::zero(), compliance: params.compliance },
        ]).await?;
        session.check_errors(&[]).await?;

        session.exec_all(&[
            CmdSet::MeasurementMode { mode: MeasureMode::Sampling, channel: channels.force },
            CmdSet::CurrentRange { channel: channels.force },
        ]).await?;

        if params.auto_abort {
            session.write_cmd(&CmdSet::SamplingAutoAbort(true)).await?;
        }

        energized.advance(MeasurementState::Armed);

        let acceptable: &[i32] = if params.auto_abort { &[AUTO_ABORT_ERROR_CODE] } else { &[] };
        let (code, readings) = execute(energized, true, acceptable).await?;
        let compliance_abort = code == AUTO_ABORT_ERROR_CODE;

        if compliance_abort {
            tracing::warn!("Sampling stopped on compliance after {} of {} points", readings.current.len(), params.points);
            readings.expect_lengths(&[Kind::Time, Kind::Current], None)?;
        }
        else {
            readings.expect_lengths(&[Kind::Time, Kind::Current], Some(params.points as usize))?;
        }

        energized.advance(MeasurementState::Parsed);

        Ok(SampleData {
            time: readings.time,
            current: readings.current,
            compliance_abort: compliance_abort,
        })
    }
}
