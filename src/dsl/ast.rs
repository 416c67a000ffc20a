use serde::Serialize;

/// A global schedule parameter (`key value...` at top level).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Int(i64),
    Single(String),
    List(Vec<String>),
}

impl Param {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Param::Int(v) => Some(*v),
            Param::Single(s) => s.parse().ok(),
            Param::List(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolDecl {
    /// Key used by `play` (may carry a `#fragment`).
    pub name: String,
    /// Source path relative to the media root; the fragment is stripped.
    pub source: String,
    pub strategy: Strategy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Sequential {
        offset: u64,
    },
    Shuffled {
        seed: String,
    },
    Random {
        seed: String,
        memory: usize,
        shared_history: Option<String>,
    },
}

/// Cutoff for `play --until`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Until {
    /// `:m`: the next multiple of `m` minutes.
    Boundary { minutes: u64 },
    /// Hour of day, e.g. `14` or `13.5`.
    Hour(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayOpts {
    pub pool: String,
    pub repeat: u64,
    pub until: Option<Until>,
    /// Minutes; only meaningful with a `:m` cutoff.
    pub ignore: f64,
    pub min: u64,
    pub max: Option<u64>,
    pub suppress: bool,
    pub as_block: bool,
}

impl PlayOpts {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            repeat: 1,
            until: None,
            ignore: 0.0,
            min: 1,
            max: None,
            suppress: false,
            as_block: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Instruction {
    Play(PlayOpts),
    Repeat(u64, Box<Instruction>),
    Invoke { name: String, args: Vec<String> },
    Print(String),
    File(String),
    OneOf(Vec<String>),
}

/// One `;`-separated statement of a block body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statement {
    pub line: usize,
    pub tokens: Vec<String>,
    /// Pre-compiled form for statements without `$N` placeholders.
    #[serde(skip)]
    pub compiled: Option<Instruction>,
}

impl Statement {
    pub fn source(&self) -> String {
        self.tokens.join(" ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    pub line: usize,
    pub statements: Vec<Statement>,
}
