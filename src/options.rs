use crate::cost::{FittingSpace, Weighting};
use crate::data::ObservationCuts;
use crate::error::ConfigurationError;
use crate::feedback::{FeedbackDescriptor, FeedbackVariant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Observable the abundance function is measured for
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum QuantityKind {
    /// Stellar mass function, quantity is `log10 M*`
    #[serde(rename = "mstar")]
    StellarMass,
    /// UV luminosity function, quantity is `log10 L_UV`
    #[serde(rename = "Muv")]
    UvLuminosity,
}

impl QuantityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::StellarMass => "mstar",
            Self::UvLuminosity => "Muv",
        }
    }

    pub fn default_options(self) -> QuantityOptions {
        match self {
            Self::StellarMass => QuantityOptions::stellar_mass(),
            Self::UvLuminosity => QuantityOptions::uv_luminosity(),
        }
    }
}

impl FromStr for QuantityKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mstar" => Ok(Self::StellarMass),
            "Muv" => Ok(Self::UvLuminosity),
            _ => Err(ConfigurationError::UnknownQuantity(s.to_owned())),
        }
    }
}

impl Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fitting options of a quantity
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuantityOptions {
    pub fitting_space: FittingSpace,
    /// Weight residuals by uncertainties relative to the observed density
    pub relative_weights: bool,
    /// Weight residuals by uncertainties at all
    #[serde(default = "QuantityOptions::default_weighted")]
    pub weighted: bool,
    /// Critical mass of the feedback models
    pub m_crit: f64,
    /// Narrowed parameter bounds per feedback model, `None` keeps the model bound
    #[serde(default)]
    pub bound_overrides: BTreeMap<FeedbackVariant, Vec<Option<(f64, f64)>>>,
    #[serde(default)]
    pub cuts: ObservationCuts,
}

impl QuantityOptions {
    pub fn stellar_mass() -> Self {
        Self {
            fitting_space: FittingSpace::Log,
            relative_weights: true,
            weighted: Self::default_weighted(),
            m_crit: 1e11,
            bound_overrides: BTreeMap::new(),
            cuts: ObservationCuts::none(),
        }
    }

    pub fn uv_luminosity() -> Self {
        Self {
            fitting_space: FittingSpace::Linear,
            ..Self::stellar_mass()
        }
    }

    #[inline]
    pub fn default_weighted() -> bool {
        true
    }

    pub fn weighting(&self) -> Weighting {
        Weighting::from_flags(self.weighted, self.relative_weights)
    }

    /// Feedback model of the given variant with bound overrides applied
    pub fn descriptor(
        &self,
        variant: FeedbackVariant,
    ) -> Result<FeedbackDescriptor, ConfigurationError> {
        let descriptor = FeedbackDescriptor::new(variant, self.m_crit)?;
        match self.bound_overrides.get(&variant) {
            Some(overrides) => descriptor.with_bound_overrides(overrides),
            None => Ok(descriptor),
        }
    }
}

impl Default for QuantityOptions {
    fn default() -> Self {
        Self::stellar_mass()
    }
}
