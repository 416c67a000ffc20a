#![forbid(unsafe_code)]

pub mod catalog;
pub mod dsl;
pub mod epg;
pub mod eval;
pub mod foundation;
pub mod pool;
pub mod resume;
pub mod station;

pub use catalog::{
    DEFAULT_ITEM_SECS, DurationTable, FsCatalog, MediaCatalog, StaticCatalog, resolve_file,
};
pub use dsl::ast::{Block, Instruction, Param, PlayOpts, PoolDecl, Statement, Strategy, Until};
pub use dsl::program::Program;
pub use epg::{Guide, GuideEntry};
pub use eval::interpreter::{MAX_INVOKE_DEPTH, run};
pub use eval::state::ProgramState;
pub use eval::{DayRun, EpgSubject, PlaylistItem, RawEpgEntry};
pub use foundation::error::{TelecastError, TelecastResult};
pub use pool::history::{History, HistoryId};
pub use pool::{Pool, PoolSet};
pub use resume::{ResumePoint, elapsed_since_start, resume};
pub use station::Station;
