use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::dsl::ast::{Block, Param, PoolDecl};
use crate::dsl::parser::parse_program;
use crate::foundation::error::{TelecastError, TelecastResult};

pub const DEFAULT_START_HOUR: u32 = 11;
pub const DEFAULT_START_DAY: &str = "2021-04-05";
pub const DEFAULT_CHOICE_SEED: &str = "telecast";

pub const INIT_BLOCK: &str = "__init__";
pub const OFF_AIR_BLOCK: &str = "__off_air__";

/// A parsed schedule: global parameters, pool declarations and named blocks.
///
/// Weekday blocks are always present after parsing (see the fallback rules in the module docs of
/// [`crate::dsl`]). A `Program` never changes once built; runtime selection state lives in
/// [`crate::PoolSet`].
#[derive(Clone, Debug, serde::Serialize)]
pub struct Program {
    params: BTreeMap<String, Param>,
    pools: BTreeMap<String, PoolDecl>,
    blocks: BTreeMap<String, Block>,
}

impl Program {
    /// Parse schedule text.
    pub fn parse(src: &str) -> TelecastResult<Self> {
        parse_program(src)
    }

    pub fn from_reader<R: Read>(mut r: R) -> TelecastResult<Self> {
        let mut src = String::new();
        r.read_to_string(&mut src)
            .map_err(|e| TelecastError::parse(0, format!("read schedule: {e}")))?;
        Self::parse(&src)
    }

    pub fn from_path(path: impl AsRef<Path>) -> TelecastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TelecastError::parse(0, format!("open schedule '{}': {e}", path.display()))
        })?;
        Self::from_reader(f)
    }

    pub(crate) fn from_parts(
        params: BTreeMap<String, Param>,
        pools: BTreeMap<String, PoolDecl>,
        blocks: BTreeMap<String, Block>,
    ) -> Self {
        Self {
            params,
            pools,
            blocks,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Param> {
        self.params.get(key)
    }

    pub fn params(&self) -> &BTreeMap<String, Param> {
        &self.params
    }

    /// Hour of day at which the broadcast day starts.
    pub fn start_hour(&self) -> u32 {
        self.params
            .get("start_hour")
            .and_then(Param::as_int)
            .and_then(|h| u32::try_from(h).ok())
            .unwrap_or(DEFAULT_START_HOUR)
    }

    /// First broadcast day; pool state is replayed from here.
    pub fn start_day(&self) -> TelecastResult<NaiveDate> {
        let raw = self
            .params
            .get("start_day")
            .and_then(Param::as_str)
            .unwrap_or(DEFAULT_START_DAY);
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| TelecastError::parse(0, format!("invalid start_day '{raw}': {e}")))
    }

    /// Seed for schedule-level choices (`oneof`).
    pub fn choice_seed(&self) -> &str {
        self.params
            .get("seed")
            .and_then(Param::as_str)
            .unwrap_or(DEFAULT_CHOICE_SEED)
    }

    pub fn pool(&self, name: &str) -> Option<&PoolDecl> {
        self.pools.get(name)
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolDecl> {
        self.pools.values()
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }
}

impl std::str::FromStr for Program {
    type Err = TelecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_params_are_absent() {
        let p = Program::parse("default:\n  print x\n").unwrap();
        assert_eq!(p.start_hour(), DEFAULT_START_HOUR);
        assert_eq!(
            p.start_day().unwrap(),
            NaiveDate::from_ymd_opt(2021, 4, 5).unwrap()
        );
        assert_eq!(p.choice_seed(), DEFAULT_CHOICE_SEED);
    }

    #[test]
    fn start_day_is_validated_on_access() {
        let p = Program::parse("start_day yesterday\ndefault:\n  print x\n").unwrap();
        assert!(p.start_day().is_err());
    }

    #[test]
    fn every_weekday_resolves() {
        let p: Program = "default:\n  print x\n".parse().unwrap();
        for day in crate::foundation::time::WEEKDAYS {
            assert!(p.has_block(crate::foundation::time::weekday_block_name(day)));
        }
    }

    #[test]
    fn from_reader_reads_all_input() {
        let src = "start_hour 6\ndefault:\n  print x\n";
        let p = Program::from_reader(src.as_bytes()).unwrap();
        assert_eq!(p.start_hour(), 6);
    }
}
