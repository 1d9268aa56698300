//! Features and the static feature↔bit registry.
//!
//! A feature is a named logical data topic a connection can subscribe to for
//! push updates. Every feature owns exactly one bit in a fixed-width mask,
//! reserved in ranges per role class so a mask can be filtered down to "the
//! common bits" or "the admin bits" with a single AND.
//!
//! The [`FeatureConfig`] table is compiled in and loaded once; it is the
//! single source of truth for bit values, authorization and distribution.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::GroupId;
use crate::roles::{AuthorizedRoles, Role};

/// Separator between the feature and user part of a group name.
pub const FEATURE_USER_SEPARATOR: &str = "@";

/// Width of one role-class bit range in the feature mask.
const FEATURE_RANGE_LEN: u32 = 8;

/// Named logical data topic a connection can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    /// Application configuration values. Baseline feature: pushed to every
    /// connection, kept across logout.
    AppConfig,
    /// Per-user configuration values, scoped to the owning user.
    UserConfig,
    /// Demo counter topic.
    Counter,
    /// Live connection monitor (admin surface).
    ClientMonitor,
}

impl Feature {
    /// All features in declaration order. Drives provider init order.
    pub const ALL: [Self; 4] = [
        Self::AppConfig,
        Self::UserConfig,
        Self::Counter,
        Self::ClientMonitor,
    ];

    /// Wire name of the feature (`APP_CONFIG`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppConfig => "APP_CONFIG",
            Self::UserConfig => "USER_CONFIG",
            Self::Counter => "COUNTER",
            Self::ClientMonitor => "CLIENT_MONITOR",
        }
    }

    /// The single bit owned by this feature.
    #[must_use]
    pub fn bit(self) -> FeatureBits {
        config_for(self).bit
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit encoding of a feature set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureBits(u32);

/// Mask covering the bit range reserved for common features.
pub const COMMON_RANGE: FeatureBits = FeatureBits((1u32 << FEATURE_RANGE_LEN) - 1);

/// Mask covering the bit range reserved for admin features.
pub const ADMIN_RANGE: FeatureBits =
    FeatureBits((1u32 << (2 * FEATURE_RANGE_LEN)) - 1 - COMMON_RANGE.0);

impl FeatureBits {
    /// No features.
    pub const NONE: Self = Self(0);

    /// Construct from a raw bit value.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether the given feature's bit is set.
    #[must_use]
    pub fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit().0 != 0
    }

    /// Set the given feature's bit.
    #[must_use]
    pub fn with(self, feature: Feature) -> Self {
        Self(self.0 | feature.bit().0)
    }

    /// Clear the given feature's bit.
    #[must_use]
    pub fn without(self, feature: Feature) -> Self {
        Self(self.0 & !feature.bit().0)
    }

    /// OR-combine with another mask.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether no bits are set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit value.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Human-readable list of the features in this mask, for logging.
    #[must_use]
    pub fn describe(self) -> String {
        let names: Vec<&str> = FEATURE_CONFIGS
            .iter()
            .filter(|cfg| self.0 & cfg.bit.0 != 0)
            .map(|cfg| cfg.feature.as_str())
            .collect();
        names.join("; ")
    }
}

impl fmt::Display for FeatureBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Policy deciding which connections a feature's updates reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Distribution {
    /// Updates reach every subscriber of the feature.
    Global,
    /// Updates reach only subscribers logged in as the owning user.
    UserSpecific,
}

/// Static descriptor of one feature.
#[derive(Clone, Copy, Debug)]
pub struct FeatureConfig {
    /// The feature this entry describes.
    pub feature: Feature,
    /// Unique bit (power of two, within the feature's role-class range).
    pub bit: FeatureBits,
    /// Display label for monitoring surfaces.
    pub label: &'static str,
    /// Short label for dense log output.
    pub abbreviation: &'static str,
    /// Roles allowed to read the feature's initial data.
    pub initial_data_roles: AuthorizedRoles,
    /// How updates are distributed to subscribers.
    pub distribution: Distribution,
}

/// The feature registry. Loaded once at compile time; order matches
/// [`Feature::ALL`].
pub const FEATURE_CONFIGS: [FeatureConfig; 4] = [
    FeatureConfig {
        feature: Feature::AppConfig,
        bit: FeatureBits(0x1),
        label: "Application Config",
        abbreviation: "ACfg",
        initial_data_roles: AuthorizedRoles::AnyRole,
        distribution: Distribution::Global,
    },
    FeatureConfig {
        feature: Feature::UserConfig,
        bit: FeatureBits(0x2),
        label: "User Config",
        abbreviation: "UCfg",
        initial_data_roles: AuthorizedRoles::Roles(&[Role::All]),
        distribution: Distribution::UserSpecific,
    },
    FeatureConfig {
        feature: Feature::Counter,
        bit: FeatureBits(0x4),
        label: "Dev Counter",
        abbreviation: "C",
        initial_data_roles: AuthorizedRoles::AnyRole,
        distribution: Distribution::Global,
    },
    FeatureConfig {
        feature: Feature::ClientMonitor,
        bit: FeatureBits(0x100),
        label: "Client Monitor",
        abbreviation: "CMon",
        initial_data_roles: AuthorizedRoles::Roles(&[Role::Admin]),
        distribution: Distribution::Global,
    },
];

/// Look up the static descriptor of a feature.
///
/// Infallible: the table covers every `Feature` variant.
#[must_use]
pub fn config_for(feature: Feature) -> &'static FeatureConfig {
    FEATURE_CONFIGS
        .iter()
        .find(|cfg| cfg.feature == feature)
        .unwrap_or_else(|| unreachable!("feature table covers every variant"))
}

/// Build the group name for a feature broadcast destination.
///
/// - `Global` features broadcast to `"<FEATURE>@"`.
/// - `UserSpecific` features broadcast to `"<FEATURE>@<user>"`.
#[must_use]
pub fn feature_group(feature: Feature, user: Option<&str>) -> GroupId {
    let name = match config_for(feature).distribution {
        Distribution::Global => format!("{feature}{FEATURE_USER_SEPARATOR}"),
        Distribution::UserSpecific => {
            format!("{feature}{FEATURE_USER_SEPARATOR}{}", user.unwrap_or_default())
        }
    };
    GroupId::from_string(name)
}

/// Build the group name for user-targeted pushes: `"@<user>"`.
#[must_use]
pub fn user_group(user: &str) -> GroupId {
    GroupId::from_string(format!("{FEATURE_USER_SEPARATOR}{user}"))
}
