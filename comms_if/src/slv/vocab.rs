//! Control protocol vocabulary
//!
//! Every vocabulary item accepts both its long name and the short form used by existing clients.
//! Replies always use the long name.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::str::FromStr;
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Implement `FromStr`, `as_str` and `ALL` for a vocabulary enum.
///
/// The first string of each arm is the canonical name, the rest are accepted aliases.
macro_rules! vocab {
    ($name:ident { $($variant:ident => [$canon:literal $(, $alias:literal)*]),+ $(,)? }) => {
        impl $name {
            /// All items of this vocabulary, in help order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical name of the item.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $canon),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($canon $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(())
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands of the control protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Suspend,
    Run,
    Configure,
    Get,
    Set,
    Ask,
    Quit,
}

/// Properties which can be read or written with `get`/`set`, plus the option keys of `ask`
/// and the input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Mode,
    Pose,
    Dof,
    JointLimit,
    Verbosity,
    Token,
    RestPosition,
    RestWeights,
    TipFrame,
    SecondTask,
    Xd,
    X,
    Q,
}

/// Whether the solver targets the full pose or the position only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseMode {
    Full,
    Xyz,
}

/// Continuous tracking or single-shot solving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    #[serde(alias = "cont")]
    Track,
    #[serde(alias = "shot")]
    Single,
}

/// On/off value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

/// Leading marker of every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nack,
}

vocab!(Command {
    Help => ["help"],
    Suspend => ["suspend", "susp"],
    Run => ["run"],
    Configure => ["configure", "cfg"],
    Get => ["get"],
    Set => ["set"],
    Ask => ["ask"],
    Quit => ["quit"],
});

vocab!(Property {
    Mode => ["mode"],
    Pose => ["pose"],
    Dof => ["dof"],
    JointLimit => ["joint-limit", "lim"],
    Verbosity => ["verbosity", "verb"],
    Token => ["token", "tok"],
    RestPosition => ["rest-position", "rest_pos"],
    RestWeights => ["rest-weights", "rest_weights"],
    TipFrame => ["tip-frame", "tip"],
    SecondTask => ["second-task", "task2"],
    Xd => ["xd"],
    X => ["x"],
    Q => ["q"],
});

vocab!(PoseMode {
    Full => ["full"],
    Xyz => ["xyz"],
});

vocab!(TrackMode {
    Track => ["track", "cont"],
    Single => ["single", "shot"],
});

vocab!(Switch {
    On => ["on"],
    Off => ["off"],
});

vocab!(Reply {
    Ack => ["ack"],
    Nack => ["nack"],
});

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The reply payload of the `help` command.
pub fn help_string() -> String {
    fn join<T: std::fmt::Display>(items: &[T]) -> String {
        items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
    }

    let values = [
        PoseMode::Full.as_str(),
        PoseMode::Xyz.as_str(),
        TrackMode::Track.as_str(),
        TrackMode::Single.as_str(),
        Switch::On.as_str(),
        Switch::Off.as_str(),
    ];

    format!(
        "commands={{{}}};options={{{}}};values={{{}}};",
        join(Command::ALL),
        join(Property::ALL),
        join(&values)
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!("susp".parse::<Command>(), Ok(Command::Suspend));
        assert_eq!("suspend".parse::<Command>(), Ok(Command::Suspend));
        assert_eq!("cfg".parse::<Command>(), Ok(Command::Configure));
        assert_eq!("lim".parse::<Property>(), Ok(Property::JointLimit));
        assert_eq!("rest_weights".parse::<Property>(), Ok(Property::RestWeights));
        assert_eq!("task2".parse::<Property>(), Ok(Property::SecondTask));
        assert_eq!("cont".parse::<TrackMode>(), Ok(TrackMode::Track));
        assert_eq!("shot".parse::<TrackMode>(), Ok(TrackMode::Single));
        assert_eq!("jump".parse::<Command>(), Err(()));
        assert_eq!(Property::TipFrame.as_str(), "tip-frame");
    }

    #[test]
    fn test_help_string() {
        let h = help_string();
        assert!(h.starts_with("commands={help, suspend, run, configure, get, set, ask, quit};"));
        assert!(h.contains("options={mode, pose, dof, joint-limit"));
        assert!(h.ends_with("values={full, xyz, track, single, on, off};"));
    }

    #[test]
    fn test_serde_modes() {
        let m: TrackMode = serde_json::from_str("\"cont\"").unwrap();
        assert_eq!(m, TrackMode::Track);
        assert_eq!(serde_json::to_string(&PoseMode::Xyz).unwrap(), "\"xyz\"");
    }
}
