use std::fmt::{Debug, Display};

use num_traits::Float;
use rand::distributions::uniform::SampleUniform;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter, EnumString};

/// Anything that can live in a dual-location buffer
pub trait Element: bytemuck::Pod + Default + Debug + Send + Sync + 'static {}

impl<T: bytemuck::Pod + Default + Debug + Send + Sync + 'static> Element for T {}

/// Floating point types the vendor libraries have routines for
pub trait BlasFloat: Element + Float + SampleUniform + Display {
    const PRECISION: Precision;

    fn cast_from(a: f64) -> Self;
    fn as_f64(self) -> f64;
    fn type_name() -> &'static str;
}

impl BlasFloat for f32 {
    const PRECISION: Precision = Precision::Single;

    fn cast_from(a: f64) -> Self {
        a as f32
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn type_name() -> &'static str {
        "float"
    }
}

impl BlasFloat for f64 {
    const PRECISION: Precision = Precision::Double;

    fn cast_from(a: f64) -> Self {
        a
    }
    fn as_f64(self) -> f64 {
        self
    }
    fn type_name() -> &'static str {
        "double"
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    StrumDisplay,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    fn prefix(self) -> char {
        match self {
            Precision::Single => 's',
            Precision::Double => 'd',
        }
    }

    /// Vendor routine name for a kernel at this precision, e.g. `saxpy` or `idamax`.
    pub fn routine_name(self, kernel: KernelKind) -> String {
        let p = self.prefix();
        match kernel {
            KernelKind::Axpy => format!("{p}axpy"),
            KernelKind::Dot => format!("{p}dot"),
            KernelKind::Copy => format!("{p}copy"),
            KernelKind::Iamax => format!("i{p}amax"),
            KernelKind::Iamin => format!("i{p}amin"),
            KernelKind::Gemv => format!("{p}gemv"),
            KernelKind::Gemm => format!("{p}gemm"),
            KernelKind::Gesv => format!("{p}gesv"),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    StrumDisplay,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Axpy,
    Dot,
    Copy,
    Iamax,
    Iamin,
    Gemv,
    Gemm,
    Gesv,
}

/// Operand transposition flag passed to level 2 and 3 routines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Transpose {
    #[default]
    NoTrans,
    Trans,
}

impl Transpose {
    pub fn is_trans(self) -> bool {
        self == Transpose::Trans
    }

    pub fn symbol(self) -> char {
        match self {
            Transpose::NoTrans => 'N',
            Transpose::Trans => 'T',
        }
    }
}

impl From<bool> for Transpose {
    fn from(trans: bool) -> Self {
        if trans {
            Transpose::Trans
        } else {
            Transpose::NoTrans
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_routine_names() {
        assert_eq!(Precision::Single.routine_name(KernelKind::Axpy), "saxpy");
        assert_eq!(Precision::Double.routine_name(KernelKind::Iamax), "idamax");
        assert_eq!(Precision::Single.routine_name(KernelKind::Iamin), "isamin");
        assert_eq!(Precision::Double.routine_name(KernelKind::Gesv), "dgesv");
        assert_eq!(f32::PRECISION, Precision::Single);
        assert_eq!(f64::PRECISION, Precision::Double);
    }

    #[test]
    fn test_kernel_names_parse() {
        for kernel in KernelKind::iter() {
            assert_eq!(KernelKind::from_str(&kernel.to_string()).unwrap(), kernel);
        }
        assert!(KernelKind::from_str("trsm").is_err());
    }
}
