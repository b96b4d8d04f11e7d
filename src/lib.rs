//! **A**synchronous-Rust **R**emote **C**ontrol for **S**ource-**M**easure **U**nits
//!
//! Drives a Keysight B1500A-family analyzer through two measurement programs, a bidirectional
//! staircase sweep and a time-domain current sample, and hands back the decoded series.
//!
//! ```no_run
//! # async fn demo() -> arcs_smu::Result<()> {
//! use arcs_smu::{ B1500a, ChannelConfig, SweepSpec, val };
//!
//! let stream = tokio::net::TcpStream::connect("10.0.0.7:5025").await?;
//! let mut smu = B1500a::with(stream);
//!
//! let channels = ChannelConfig::new(3, 4, val!(1, Milli Ampere));
//! let sweep = SweepSpec::new()
//!     .end(val!(1.0, Volt))
//!     .points(101)
//!     .ramp_rate(0.2)
//!     .compliance(val!(1, Milli Ampere));
//!
//! let data = smu.run_sweep(&channels, &sweep).await?;
//! assert_eq!(data.len(), 202);
//! # Ok(())
//! # }
//! ```

#[macro_use]
pub mod units;

pub mod cmd;
pub mod config;
pub mod devices;
pub mod error;
pub mod measure;
pub mod response;
pub mod session;
pub mod spec;

pub use devices::B1500a;
pub use error::{ MeasureError, Result };
pub use measure::{ SweepData, SampleData, SweepMeasurement, SamplingMeasurement, AUTO_ABORT_ERROR_CODE };
pub use response::{ ParseError, FormatError };
pub use session::{ Session, LineEnding };
pub use spec::{ ChannelConfig, SweepSpec, SampleSpec };
pub use units::{ Ampere, Volt, Second };
