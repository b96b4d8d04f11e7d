//! Typed electrical quantities
//!
//! Source-measure units work in signed, floating quantities spanning many decades (femtoamp leakage to
//! 100 V bias), so unlike fixed-point bookkeeping these wrap an `f64` in base units. The wrappers only
//! exist to keep volts, amps and seconds from being swapped in a command argument list.

use std::{
    fmt::{ self, Write },
    ops::{ Add, Sub, Neg },
    cmp::{ PartialEq, PartialOrd, Ordering },
};

/// Defines a scalar prefix type for constructing and displaying units without changing the underlying
/// value e.g. "milli-" or "micro-"
pub trait Scalar
{
    /// Decimal exponent of the prefix, -3 for milli
    fn magnitude() -> i32;

    /// ASCII prefix letter, `u` for micro
    fn notation() -> &'static str;

    /// Converts a number expressed with this prefix into base units
    fn to_base(num: f64) -> f64
    {
        to_base(num, Self::magnitude())
    }
}

// dividing by an exact power of ten keeps decimal inputs such as 5 µA as close as possible to their
// written value, multiplying by 1e-6 does not
fn to_base(num: f64, magnitude: i32) -> f64
{
    if magnitude < 0 {
        num / 10f64.powi(-magnitude)
    }
    else {
        num * 10f64.powi(magnitude)
    }
}

fn from_base(value: f64, magnitude: i32) -> f64
{
    if magnitude < 0 {
        value * 10f64.powi(-magnitude)
    }
    else {
        value / 10f64.powi(magnitude)
    }
}

pub mod scalar
{
    use super::Scalar;

    macro_rules! impl_prefix
    {
        { $name:ident, $magnitude:literal, $notation:literal } => {
            pub struct $name {}

            impl $name
            {
                pub const MAGNITUDE: i32 = $magnitude;
                pub const NOTATION: &'static str = $notation;
            }

            impl Scalar for $name
            {
                fn magnitude() -> i32
                {
                    Self::MAGNITUDE
                }

                fn notation() -> &'static str
                {
                    Self::NOTATION
                }
            }
        }
    }

    impl_prefix!{ Micro, -6, "u" }
    impl_prefix!{ Milli, -3, "m" }
    impl_prefix!{ Base, 0, "" }
}

pub use scalar::{ Micro, Milli, Base };

pub struct UnitDisplay
{
    symbol: &'static str,
    notation: &'static str,
    magnitude: i32,
    value: f64,
    hide_unit: bool,
}

impl fmt::Display for UnitDisplay
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        // -0 is written as 0
        let scaled = from_base(self.value, self.magnitude) + 0.0;

        // without a precision the shortest representation which round-trips is written, which is what
        // the instrument expects for programmed values
        if let Some(precision) = f.precision() {
            write!(f, "{:.*}", precision, scaled)?;
        }
        else {
            write!(f, "{}", scaled)?;
        }

        if self.hide_unit {
            Ok(())
        }
        else {
            f.write_str(self.notation)?;
            f.write_str(self.symbol)
        }
    }
}

/// An electrical current
#[derive(Debug, Clone, Copy)]
pub struct Ampere
{
    value: f64,
}

/// An electrical potential
#[derive(Debug, Clone, Copy)]
pub struct Volt
{
    value: f64,
}

/// A time duration or timestamp
#[derive(Debug, Clone, Copy)]
pub struct Second
{
    value: f64,
}

macro_rules! impl_unit
{
    { $u:ty, $symbol:literal } => {
        impl $u
        {
            /// Unit symbol written after the prefix
            pub const SYMBOL: &'static str = $symbol;

            /// Formats the value scaled to prefix `S`, followed by the prefix and symbol
            pub fn display<S: Scalar>(&self) -> UnitDisplay
            {
                UnitDisplay {
                    symbol: Self::SYMBOL,
                    notation: S::notation(),
                    magnitude: S::magnitude(),
                    value: self.value,
                    hide_unit: false,
                }
            }

            /// Formats the value scaled to prefix `S` as a bare number
            pub fn display_anon<S: Scalar>(&self) -> UnitDisplay
            {
                UnitDisplay {
                    symbol: Self::SYMBOL,
                    notation: S::notation(),
                    magnitude: S::magnitude(),
                    value: self.value,
                    hide_unit: true,
                }
            }

            /// Formats the value in base units with the symbol
            pub fn display_base(&self) -> UnitDisplay
            {
                self.display::<Base>()
            }

            /// Formats the value in base units as a bare number, as command arguments are written
            pub fn display_anon_base(&self) -> UnitDisplay
            {
                self.display_anon::<Base>()
            }

            /// Constructs a value from a number expressed with the given scalar prefix
            ///
            /// For example, 5 µA is `from_f64::<Micro>(5.0)`
            pub fn from_f64<S: Scalar>(num: f64) -> Self
            {
                Self { value: S::to_base(num) }
            }

            /// Wraps a number already in base units
            pub fn from_f64_base(num: f64) -> Self
            {
                Self { value: num }
            }

            pub fn zero() -> Self
            {
                Self { value: 0.0 }
            }

            /// Returns the value expressed with the given scalar prefix
            pub fn as_f64<S: Scalar>(&self) -> f64
            {
                from_base(self.value, S::magnitude())
            }

            pub fn as_f64_base(&self) -> f64
            {
                self.value
            }

            pub fn is_finite(&self) -> bool
            {
                self.value.is_finite()
            }
        }

        impl Add for $u
        {
            type Output = Self;

            fn add(self, rhs: Self) -> Self
            {
                Self { value: self.value + rhs.value }
            }
        }

        impl Sub for $u
        {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self
            {
                Self { value: self.value - rhs.value }
            }
        }

        impl Neg for $u
        {
            type Output = Self;

            fn neg(self) -> Self
            {
                Self { value: -self.value }
            }
        }

        impl PartialEq for $u
        {
            fn eq(&self, rhs: &Self) -> bool
            {
                self.value == rhs.value
            }
        }

        impl PartialOrd for $u
        {
            fn partial_cmp(&self, rhs: &Self) -> Option<Ordering>
            {
                self.value.partial_cmp(&rhs.value)
            }
        }

        impl fmt::Display for $u
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                fmt::Display::fmt(&self.display_base(), f)
            }
        }
    }
}

impl_unit!{ Ampere, "A" }
impl_unit!{ Volt, "V" }
impl_unit!{ Second, "s" }

impl Second
{
    /// Seconds elapsed for `volts` at a constant `volts_per_sec` rate
    pub fn ramp(volts: Volt, volts_per_sec: f64) -> Self
    {
        Self { value: volts.value / volts_per_sec }
    }
}

/// Constructs a unit value from a number with an optional scalar prefix
///
/// `val!(1.5, Volt)` is 1.5 V and `val!(5, Micro Ampere)` is 5 µA.
#[macro_export]
macro_rules! val
{
    ( $num:expr, $u:ident ) => {
        $crate::units::$u::from_f64_base(($num) as f64)
    };
    ( $num:expr, $prefix:ident $u:ident ) => {
        $crate::units::$u::from_f64::<$crate::units::$prefix>(($num) as f64)
    };
}

/// Displays a unit value without its symbol, as used in command arguments
macro_rules! view_anon
{
    ( $u:expr ) => {
        $u.display_anon_base()
    };
}

/// Writes a sequence of values separated by commas
pub(crate) fn write_list<I, D>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
    where I: IntoIterator<Item = D>,
          D: fmt::Display,
{
    for (index, item) in items.into_iter().enumerate() {
        if index != 0 {
            f.write_char(',')?;
        }
        write!(f, "{}", item)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::{ Ampere, Second, Milli, Micro };

    #[test]
    fn precision_rounds()
    {
        assert_eq!(&format!("{:.2}", val!(12.345678, Volt).display_anon_base()), "12.35");
    }

    #[test]
    fn no_precision_prints_shortest()
    {
        assert_eq!(&format!("{}", val!(1, Milli Ampere).display_anon_base()), "0.001");
        assert_eq!(&format!("{}", val!(-1.5, Volt).display_anon_base()), "-1.5");
    }

    #[test]
    fn prefixed_with_symbol()
    {
        let amp = val!(12345.678, Milli Ampere);
        assert_eq!(&format!("{:.3}", amp.display::<Milli>()), "12345.678mA");
    }

    #[test]
    fn prefixes_scale_in_and_out()
    {
        let amp = Ampere::from_f64::<Micro>(5.0);
        assert!((amp.as_f64_base() - 5e-6).abs() < 1e-18);
        assert!((amp.as_f64::<Micro>() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_time()
    {
        let dwell = Second::ramp(val!(1.0, Volt), 0.2);
        assert!((dwell.as_f64_base() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn negation()
    {
        assert_eq!(-val!(2, Volt), val!(-2, Volt));
    }

    #[test]
    fn negative_zero_written_as_zero()
    {
        assert_eq!(&format!("{}", (-val!(0, Volt)).display_anon_base()), "0");
        assert_eq!(&format!("{:.2}", val!(-0.0, Volt).display_anon_base()), "0.00");
    }
}
