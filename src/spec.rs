//! Measurement parameter builders
//!
//! Specs are cheap, caller-owned values built per measurement. Nothing is checked while building;
//! everything is checked at once when the measurement starts, before a single command is written.

use crate::{
    error::{ MeasureError, Result },
    units::{ Ampere, Volt, Second },
};

/// The two channels wired to the device under test and the current compliance in force on them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig
{
    /// Channel forcing the programmed voltage on the terminal of interest
    pub force: u8,
    /// Reference channel on the other terminal, held at 0 V
    pub common: u8,
    pub compliance: Ampere,
}

impl ChannelConfig
{
    pub fn new(force: u8, common: u8, compliance: Ampere) -> Self
    {
        Self {
            force: force,
            common: common,
            compliance: compliance,
        }
    }

    pub(crate) fn validate(&self) -> Result<()>
    {
        if self.force == self.common {
            return Err(MeasureError::InvalidSpec("force and common channels must differ"));
        }

        validate_compliance(self.compliance)
    }

    pub(crate) fn channels(&self) -> Vec<u8>
    {
        vec![self.force, self.common]
    }
}

fn validate_compliance(compliance: Ampere) -> Result<()>
{
    if compliance.is_finite() && compliance > Ampere::zero() {
        Ok(())
    }
    else {
        Err(MeasureError::InvalidSpec("compliance must be a positive current"))
    }
}

/// A bidirectional staircase sweep: `start → end` then `start → -end`
#[derive(Debug, Clone)]
pub struct SweepSpec
{
    start: Option<Volt>,
    end: Option<Volt>,
    points: Option<u32>,
    ramp_rate: Option<f64>,
    compliance: Option<Ampere>,
}

/// A validated sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SweepParams
{
    pub start: Volt,
    pub end: Volt,
    pub points: u32,
    pub compliance: Ampere,
    pub delay: Second,
}

impl SweepSpec
{
    pub fn new() -> Self
    {
        Self {
            start: None,
            end: None,
            points: None,
            ramp_rate: None,
            compliance: None,
        }
    }

    /// Voltage both passes start from. Defaults to 0 V.
    pub fn start(mut self, volts: Volt) -> Self
    {
        self.start = Some(volts);
        self
    }

    /// Turning point of the positive pass; the negative pass turns at the negation of this
    pub fn end(mut self, volts: Volt) -> Self
    {
        self.end = Some(volts);
        self
    }

    /// Number of staircase steps in each pass
    pub fn points(mut self, points: u32) -> Self
    {
        self.points = Some(points);
        self
    }

    /// Sweep rate in volts per second, which sets the per-step delay
    pub fn ramp_rate(mut self, volts_per_sec: f64) -> Self
    {
        self.ramp_rate = Some(volts_per_sec);
        self
    }

    pub fn compliance(mut self, amps: Ampere) -> Self
    {
        self.compliance = Some(amps);
        self
    }

    /// Per-step delay `(end - start) / (points * ramp_rate)`
    pub fn delay(&self) -> Result<Second>
    {
        self.validate().map(|params| params.delay)
    }

    pub(crate) fn validate(&self) -> Result<SweepParams>
    {
        let start = self.start.unwrap_or_else(Volt::zero);
        let end = self.end.ok_or(MeasureError::InvalidSpec("sweep end voltage is required"))?;
        let points = self.points.ok_or(MeasureError::InvalidSpec("sweep point count is required"))?;
        let ramp_rate = self.ramp_rate.ok_or(MeasureError::InvalidSpec("sweep ramp rate is required"))?;
        let compliance = self.compliance.ok_or(MeasureError::InvalidSpec("sweep compliance is required"))?;

        if !start.is_finite() || !end.is_finite() {
            return Err(MeasureError::InvalidSpec("sweep voltages must be finite"));
        }

        // point counts below two are the caller's business, zero would divide by zero below
        if points == 0 {
            return Err(MeasureError::InvalidSpec("sweep needs at least one point"));
        }

        if !ramp_rate.is_finite() || ramp_rate <= 0.0 {
            return Err(MeasureError::InvalidSpec("ramp rate must be positive and finite"));
        }

        validate_compliance(compliance)?;

        let delay = Second::ramp(end - start, points as f64 * ramp_rate);

        if !delay.is_finite() || delay < Second::zero() {
            return Err(MeasureError::InvalidSpec("sweep end must not be below its start"));
        }

        Ok(SweepParams {
            start: start,
            end: end,
            points: points,
            compliance: compliance,
            delay: delay,
        })
    }
}

/// A fixed-interval current sample at constant bias
#[derive(Debug, Clone)]
pub struct SampleSpec
{
    bias: Option<Volt>,
    timestep: Option<Second>,
    points: Option<u32>,
    compliance: Option<Ampere>,
    auto_abort: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SampleParams
{
    pub bias: Volt,
    pub timestep: Second,
    pub points: u32,
    pub compliance: Ampere,
    pub auto_abort: bool,
}

impl SampleSpec
{
    pub fn new() -> Self
    {
        Self {
            bias: None,
            timestep: None,
            points: None,
            compliance: None,
            auto_abort: false,
        }
    }

    pub fn bias(mut self, volts: Volt) -> Self
    {
        self.bias = Some(volts);
        self
    }

    pub fn timestep(mut self, seconds: Second) -> Self
    {
        self.timestep = Some(seconds);
        self
    }

    pub fn points(mut self, points: u32) -> Self
    {
        self.points = Some(points);
        self
    }

    pub fn compliance(mut self, amps: Ampere) -> Self
    {
        self.compliance = Some(amps);
        self
    }

    /// Stop sampling as soon as the force channel reaches compliance
    ///
    /// Meant for forming, where letting the current sit at compliance would damage the device.
    pub fn auto_abort_on_compliance(mut self, enable: bool) -> Self
    {
        self.auto_abort = enable;
        self
    }

    pub(crate) fn validate(&self) -> Result<SampleParams>
    {
        let bias = self.bias.ok_or(MeasureError::InvalidSpec("sampling bias voltage is required"))?;
        let timestep = self.timestep.ok_or(MeasureError::InvalidSpec("sampling timestep is required"))?;
        let points = self.points.ok_or(MeasureError::InvalidSpec("sampling point count is required"))?;
        let compliance = self.compliance.ok_or(MeasureError::InvalidSpec("sampling compliance is required"))?;

        if !bias.is_finite() {
            return Err(MeasureError::InvalidSpec("sampling bias must be finite"));
        }

        if !timestep.is_finite() || timestep <= Second::zero() {
            return Err(MeasureError::InvalidSpec("sampling timestep must be positive"));
        }

        if points == 0 {
            return Err(MeasureError::InvalidSpec("sampling needs at least one point"));
        }

        validate_compliance(compliance)?;

        Ok(SampleParams {
            bias: bias,
            timestep: timestep,
            points: points,
            compliance: compliance,
            auto_abort: self.auto_abort,
        })
    }
}
