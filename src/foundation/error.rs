pub type TelecastResult<T> = Result<T, TelecastError>;

#[derive(thiserror::Error, Debug)]
pub enum TelecastError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("undefined block '{name}' (statement `{statement}`, t={at_secs}s)")]
    UndefinedBlock {
        name: String,
        statement: String,
        at_secs: u64,
    },

    #[error("pool '{pool}' has no candidates")]
    EmptyPool { pool: String },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TelecastError {
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn empty_pool(pool: impl Into<String>) -> Self {
        Self::EmptyPool { pool: pool.into() }
    }

    /// True for failures that only invalidate the day being computed.
    pub fn is_day_scoped(&self) -> bool {
        matches!(self, Self::UndefinedBlock { .. } | Self::Evaluation(_))
    }
}
