use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialization used on one side of a function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Devalue,
    Json,
    /// No parsing or serialization; the handler deals in raw requests and responses.
    Manual,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Devalue => "devalue",
            Codec::Json => "json",
            Codec::Manual => "manual",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calling convention of a remote module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Mode {
    Websocket,
    Function { input: Codec, output: Codec },
}

impl Mode {
    pub fn function(input: Codec, output: Codec) -> Self {
        Mode::Function { input, output }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Mode::Websocket)
    }

    /// True when generated code for this mode imports `devalue`.
    pub fn uses_devalue(&self) -> bool {
        match self {
            Mode::Websocket => false,
            Mode::Function { input, output } => {
                *input == Codec::Devalue || *output == Codec::Devalue
            }
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Function {
            input: Codec::Json,
            output: Codec::Json,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Websocket => f.write_str("websocket"),
            Mode::Function { input, output } => write!(f, "function({} -> {})", input, output),
        }
    }
}

/// Whether identities are assigned for a dev session or a production build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Dev,
    Build,
}
