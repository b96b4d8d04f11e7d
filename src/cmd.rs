//! Instrument command definition and serialization
//!
//! Commands are the B1500-family "FLEX" mnemonics: a short mnemonic followed by comma separated
//! channel and numeric arguments. Only a handful are queries which produce a reply line.

use std::fmt;
use crate::units::{ Ampere, Volt, Second, write_list };

/// Output data format selected with `FMT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat
{
    /// ASCII, 12 digits with header, comma separated
    AsciiHeadered,
}

/// Which source data is appended to the measurement data by `FMT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode
{
    /// Primary sweep source output data
    PrimarySweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMode
{
    Auto,
    /// The sample count is used as-is, not multiplied by the initial value
    Manual,
}

/// Measurement mode selected with `MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode
{
    StaircaseSweep,
    Sampling,
}

/// Which side of the source the `CMM` measurement operation takes place on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureSide
{
    ComplianceSide,
    Current,
    Voltage,
}

/// Sweep shape programmed with `WV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepShape
{
    /// `start → stop`
    LinearSingle,
    /// `start → stop → start`
    LinearDouble,
}

impl SweepShape
{
    /// Number of steps, and so of readings per kind, the instrument returns for a `points`-step program
    pub fn steps(&self, points: u32) -> usize
    {
        match self {
            Self::LinearSingle => points as usize,
            Self::LinearDouble => 2 * points as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adc
{
    HighSpeed,
    HighResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationMode
{
    Auto,
    Manual,
}

/// Ranging selection shared by `DV`, `RI`, `WV` and `MV`; the instrument only takes the auto
/// ranging code from this driver
pub const AUTO_RANGE: u8 = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum CmdSet
{
    /// Reset the instrument to its initial settings
    ///
    /// Command: `*RST`
    Reset,
    /// Identification query
    ///
    /// Command: `*IDN?`
    Identify,
    /// Map a module slot onto a logical SMU channel number
    ///
    /// Command: `ACH <channel>,<slot>`
    AssignChannel { channel: u8, slot: u8 },
    /// Enable the output switch of the given channels. An empty list enables every channel.
    ///
    /// Command: `CN [<ch>,...]`
    EnableChannels(Vec<u8>),
    /// Disable the output switch of the given channels. An empty list disables every channel.
    ///
    /// Command: `CL [<ch>,...]`
    DisableChannels(Vec<u8>),
    /// Clears the output buffer and selects the data format
    ///
    /// Command: `FMT <format>,<mode>`
    Format(OutputFormat, OutputMode),
    /// Command: `TSC <1|0>`
    Timestamp(bool),
    /// Command: `AV <samples>,<mode>`
    Averaging { samples: u16, mode: AveragingMode },
    /// Enables the SMU output filter
    ///
    /// Command: `FL <1|0>`
    Filter(bool),
    /// Force a DC voltage on a channel
    ///
    /// Command: `DV <ch>,<range>,<volts>,<compliance>`
    ForceVoltage { channel: u8, voltage: Volt, compliance: Ampere },
    /// Command: `MM <mode>,<ch>`
    MeasurementMode { mode: MeasureMode, channel: u8 },
    /// Command: `CMM <ch>,<side>`
    MeasureSide { channel: u8, side: MeasureSide },
    /// Command: `RI <ch>,<range>`
    CurrentRange { channel: u8 },
    /// Staircase sweep hold and per-step delay times
    ///
    /// Command: `WT <hold>,<delay>`
    SweepTiming { hold: Second, delay: Second },
    /// Abort a sweep automatically once any channel reaches compliance
    ///
    /// Command: `WM <2|1>`
    SweepAutoAbort(bool),
    /// Staircase sweep voltage program
    ///
    /// Command: `WV <ch>,<shape>,<range>,<start>,<stop>,<points>,<compliance>`
    SweepVoltage { channel: u8, shape: SweepShape, start: Volt, stop: Volt, points: u32, compliance: Ampere },
    /// Sampling measurement timing
    ///
    /// Command: `MT <base_hold>,<interval>,<points>,<base_time>`
    SamplingTiming { base_hold: Second, interval: Second, points: u32, base_time: Second },
    /// Sampling bias source
    ///
    /// Command: `MV <ch>,<range>,<base>,<bias>,<compliance>`
    SamplingVoltage { channel: u8, base: Volt, bias: Volt, compliance: Ampere },
    /// Abort a sampling measurement automatically once any channel reaches compliance
    ///
    /// Command: `MSC <2|1>`
    SamplingAutoAbort(bool),
    /// Command: `AAD <ch>,<adc>`
    AdcType { channel: u8, adc: Adc },
    /// Command: `AIT <adc>,<mode>,<coefficient>`
    AdcIntegration { adc: Adc, mode: IntegrationMode, coefficient: u16 },
    /// Command: `AZ <1|0>`
    AdcAutoZero(bool),
    /// Reset the timestamp counter
    ///
    /// Command: `TSR`
    ResetTimer,
    /// Trigger the programmed measurement
    ///
    /// Command: `XE`
    Execute,
    /// Blocks until every pending operation completed and then replies `1`
    ///
    /// Command: `*OPC?`
    OperationComplete,
    /// Pops the oldest code from the error register
    ///
    /// Command: `ERR? 1`
    ErrorQuery,
    /// Command: `EMG? <code>`
    ErrorMessage(i32),
    /// Force every channel to 0 V while keeping output switches closed
    ///
    /// Command: `DZ`
    DeEnergize,
}

impl CmdSet
{
    /// True if the instrument replies to this command with a line of text
    pub fn is_query(&self) -> bool
    {
        matches!(
            self,
            Self::Identify | Self::OperationComplete | Self::ErrorQuery | Self::ErrorMessage(_)
        )
    }

    /// True if this command starts instrument activity which must be waited on before anything else
    /// is written
    pub fn triggers(&self) -> bool
    {
        matches!(self, Self::Execute)
    }
}

fn bool_code(flag: bool) -> char
{
    if flag { '1' } else { '0' }
}

/// Auto-abort commands use 2 for enabled and 1 for disabled
fn abort_code(enabled: bool) -> char
{
    if enabled { '2' } else { '1' }
}

impl fmt::Display for CmdSet
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Reset => write!(f, "*RST"),
            Self::Identify => write!(f, "*IDN?"),
            Self::AssignChannel { channel, slot } => write!(f, "ACH {},{}", channel, slot),
            Self::EnableChannels(channels) => {
                f.write_str("CN")?;
                if !channels.is_empty() {
                    f.write_str(" ")?;
                    write_list(f, channels)?;
                }
                Ok(())
            },
            Self::DisableChannels(channels) => {
                f.write_str("CL")?;
                if !channels.is_empty() {
                    f.write_str(" ")?;
                    write_list(f, channels)?;
                }
                Ok(())
            },
            Self::Format(format, mode) => write!(
                f,
                "FMT {},{}",
                match format {
                    OutputFormat::AsciiHeadered => '1',
                },
                match mode {
                    OutputMode::PrimarySweep => '1',
                }
            ),
            Self::Timestamp(enable) => write!(f, "TSC {}", bool_code(*enable)),
            Self::Averaging { samples, mode } => write!(
                f,
                "AV {},{}",
                samples,
                match mode {
                    AveragingMode::Auto => '0',
                    AveragingMode::Manual => '1',
                }
            ),
            Self::Filter(enable) => write!(f, "FL {}", bool_code(*enable)),
            Self::ForceVoltage { channel, voltage, compliance } => write!(
                f,
                "DV {},{},{},{}",
                channel,
                AUTO_RANGE,
                view_anon!(voltage),
                view_anon!(compliance)
            ),
            Self::MeasurementMode { mode, channel } => write!(
                f,
                "MM {},{}",
                match mode {
                    MeasureMode::StaircaseSweep => 2,
                    MeasureMode::Sampling => 10,
                },
                channel
            ),
            Self::MeasureSide { channel, side } => write!(
                f,
                "CMM {},{}",
                channel,
                match side {
                    MeasureSide::ComplianceSide => '0',
                    MeasureSide::Current => '1',
                    MeasureSide::Voltage => '2',
                }
            ),
            Self::CurrentRange { channel } => write!(f, "RI {},{}", channel, AUTO_RANGE),
            Self::SweepTiming { hold, delay } => write!(f, "WT {},{}", view_anon!(hold), view_anon!(delay)),
            Self::SweepAutoAbort(enable) => write!(f, "WM {}", abort_code(*enable)),
            Self::SweepVoltage { channel, shape, start, stop, points, compliance } => write!(
                f,
                "WV {},{},{},{},{},{},{}",
                channel,
                match shape {
                    SweepShape::LinearSingle => '1',
                    SweepShape::LinearDouble => '3',
                },
                AUTO_RANGE,
                view_anon!(start),
                view_anon!(stop),
                points,
                view_anon!(compliance)
            ),
            Self::SamplingTiming { base_hold, interval, points, base_time } => write!(
                f,
                "MT {},{},{},{}",
                view_anon!(base_hold),
                view_anon!(interval),
                points,
                view_anon!(base_time)
            ),
            Self::SamplingVoltage { channel, base, bias, compliance } => write!(
                f,
                "MV {},{},{},{},{}",
                channel,
                AUTO_RANGE,
                view_anon!(base),
                view_anon!(bias),
                view_anon!(compliance)
            ),
            Self::SamplingAutoAbort(enable) => write!(f, "MSC {}", abort_code(*enable)),
            Self::AdcType { channel, adc } => write!(
                f,
                "AAD {},{}",
                channel,
                match adc {
                    Adc::HighSpeed => '0',
                    Adc::HighResolution => '1',
                }
            ),
            Self::AdcIntegration { adc, mode, coefficient } => write!(
                f,
                "AIT {},{},{}",
                match adc {
                    Adc::HighSpeed => '0',
                    Adc::HighResolution => '1',
                },
                match mode {
                    IntegrationMode::Auto => '0',
                    IntegrationMode::Manual => '1',
                },
                coefficient
            ),
            Self::AdcAutoZero(enable) => write!(f, "AZ {}", bool_code(*enable)),
            Self::ResetTimer => write!(f, "TSR"),
            Self::Execute => write!(f, "XE"),
            Self::OperationComplete => write!(f, "*OPC?"),
            Self::ErrorQuery => write!(f, "ERR? 1"),
            Self::ErrorMessage(code) => write!(f, "EMG? {}", code),
            Self::DeEnergize => write!(f, "DZ"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::{ CmdSet, OutputFormat, OutputMode, AveragingMode, MeasureMode, MeasureSide, SweepShape, Adc, IntegrationMode };
    use crate::units::{ Second, Volt };

    #[test]
    fn serialize_setup()
    {
        assert_eq!(&format!("{}", CmdSet::Reset), "*RST");
        assert_eq!(&format!("{}", CmdSet::EnableChannels(vec![3, 4])), "CN 3,4");
        assert_eq!(&format!("{}", CmdSet::EnableChannels(vec![])), "CN");
        assert_eq!(&format!("{}", CmdSet::DisableChannels(vec![])), "CL");
        assert_eq!(&format!("{}", CmdSet::Format(OutputFormat::AsciiHeadered, OutputMode::PrimarySweep)), "FMT 1,1");
        assert_eq!(&format!("{}", CmdSet::Timestamp(true)), "TSC 1");
        assert_eq!(&format!("{}", CmdSet::Averaging { samples: 30, mode: AveragingMode::Manual }), "AV 30,1");
        assert_eq!(&format!("{}", CmdSet::Filter(false)), "FL 0");
        assert_eq!(&format!("{}", CmdSet::AssignChannel { channel: 6, slot: 2 }), "ACH 6,2");
    }

    #[test]
    fn serialize_sweep()
    {
        assert_eq!(
            &format!("{}", CmdSet::ForceVoltage { channel: 3, voltage: Volt::zero(), compliance: val!(1, Milli Ampere) }),
            "DV 3,0,0,0.001"
        );
        assert_eq!(&format!("{}", CmdSet::MeasurementMode { mode: MeasureMode::StaircaseSweep, channel: 3 }), "MM 2,3");
        assert_eq!(&format!("{}", CmdSet::MeasureSide { channel: 3, side: MeasureSide::Current }), "CMM 3,1");
        assert_eq!(&format!("{}", CmdSet::CurrentRange { channel: 3 }), "RI 3,0");
        assert_eq!(
            &format!("{}", CmdSet::SweepTiming { hold: Second::zero(), delay: val!(0.25, Second) }),
            "WT 0,0.25"
        );
        assert_eq!(&format!("{}", CmdSet::SweepAutoAbort(false)), "WM 1");
        assert_eq!(
            &format!("{}", CmdSet::SweepVoltage {
                channel: 3,
                shape: SweepShape::LinearDouble,
                start: Volt::zero(),
                stop: val!(-1.5, Volt),
                points: 101,
                compliance: val!(1, Milli Ampere),
            }),
            "WV 3,3,0,0,-1.5,101,0.001"
        );
    }

    #[test]
    fn serialize_sampling()
    {
        assert_eq!(&format!("{}", CmdSet::AdcType { channel: 4, adc: Adc::HighResolution }), "AAD 4,1");
        assert_eq!(
            &format!("{}", CmdSet::AdcIntegration { adc: Adc::HighResolution, mode: IntegrationMode::Manual, coefficient: 3 }),
            "AIT 1,1,3"
        );
        assert_eq!(&format!("{}", CmdSet::AdcAutoZero(false)), "AZ 0");
        assert_eq!(
            &format!("{}", CmdSet::SamplingTiming {
                base_hold: Second::zero(),
                interval: val!(50, Milli Second),
                points: 200,
                base_time: Second::zero(),
            }),
            "MT 0,0.05,200,0"
        );
        assert_eq!(
            &format!("{}", CmdSet::SamplingVoltage {
                channel: 3,
                base: Volt::zero(),
                bias: val!(3.5, Volt),
                compliance: val!(5, Micro Ampere),
            }),
            "MV 3,0,0,3.5,0.000005"
        );
        assert_eq!(&format!("{}", CmdSet::SamplingAutoAbort(true)), "MSC 2");
        assert_eq!(&format!("{}", CmdSet::MeasurementMode { mode: MeasureMode::Sampling, channel: 3 }), "MM 10,3");
    }

    #[test]
    fn serialize_sync_and_errors()
    {
        assert_eq!(&format!("{}", CmdSet::ResetTimer), "TSR");
        assert_eq!(&format!("{}", CmdSet::Execute), "XE");
        assert_eq!(&format!("{}", CmdSet::OperationComplete), "*OPC?");
        assert_eq!(&format!("{}", CmdSet::ErrorQuery), "ERR? 1");
        assert_eq!(&format!("{}", CmdSet::ErrorMessage(660)), "EMG? 660");
        assert_eq!(&format!("{}", CmdSet::DeEnergize), "DZ");
    }

    #[test]
    fn double_stair_returns_twice_the_steps()
    {
        assert_eq!(SweepShape::LinearSingle.steps(101), 101);
        assert_eq!(SweepShape::LinearDouble.steps(101), 202);
    }

    #[test]
    fn queries_are_flagged()
    {
        assert!(CmdSet::OperationComplete.is_query());
        assert!(CmdSet::ErrorMessage(1).is_query());
        assert!(!CmdSet::Execute.is_query());
        assert!(CmdSet::Execute.triggers());
    }
}
