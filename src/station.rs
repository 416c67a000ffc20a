//! A schedule that is advanced day by day from its epoch.
//!
//! Pool state depends on every day aired before, so the playlist for a date is only correct
//! after replaying all days from `start_day`. [`Station`] owns that replay.

use std::path::Path;

use chrono::NaiveDate;

use crate::catalog::{DurationTable, FsCatalog};
use crate::dsl::program::{INIT_BLOCK, OFF_AIR_BLOCK, Program};
use crate::eval::DayRun;
use crate::eval::interpreter::run;
use crate::foundation::error::{TelecastError, TelecastResult};
use crate::pool::PoolSet;

#[derive(Debug)]
pub struct Station {
    program: Program,
    pools: PoolSet,
    durations: DurationTable,
    next_day: NaiveDate,
    off_air: Option<DayRun>,
}

impl Station {
    /// Run `__init__` and build the off-air playlist (both optional), then stand at `start_day`.
    #[tracing::instrument(skip_all)]
    pub fn boot(
        program: Program,
        mut pools: PoolSet,
        durations: DurationTable,
    ) -> TelecastResult<Self> {
        let next_day = program.start_day()?;
        if program.has_block(INIT_BLOCK) {
            let init = run(&program, &mut pools, &durations, Some(INIT_BLOCK), None)?;
            tracing::debug!(items = init.playlist.len(), "init block done");
        }
        let off_air = if program.has_block(OFF_AIR_BLOCK) {
            Some(run(&program, &mut pools, &durations, Some(OFF_AIR_BLOCK), None)?)
        } else {
            None
        };
        Ok(Self {
            program,
            pools,
            durations,
            next_day,
            off_air,
        })
    }

    /// Load a schedule and media tree from disk. `times` is an optional `file,duration` CSV.
    pub fn open(
        program_path: impl AsRef<Path>,
        sources: impl AsRef<Path>,
        times: Option<&Path>,
    ) -> TelecastResult<Self> {
        let sources = sources.as_ref();
        let program = Program::from_path(program_path)?;
        let pools = PoolSet::build(&program, &FsCatalog::new(sources))?;
        let durations = match times {
            Some(path) => DurationTable::from_csv_path(path, sources)?,
            None => DurationTable::new(),
        };
        Self::boot(program, pools, durations)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    pub fn durations(&self) -> &DurationTable {
        &self.durations
    }

    /// First date not yet evaluated.
    pub fn next_day(&self) -> NaiveDate {
        self.next_day
    }

    pub fn off_air(&self) -> Option<&DayRun> {
        self.off_air.as_ref()
    }

    /// Replay every day before `date` and evaluate `date` itself.
    ///
    /// Days already evaluated cannot be revisited. A failing day during the replay is logged and
    /// skipped; a failure on `date` is returned.
    #[tracing::instrument(skip(self), fields(from = %self.next_day))]
    pub fn day(&mut self, date: NaiveDate) -> TelecastResult<DayRun> {
        if date < self.next_day {
            return Err(TelecastError::evaluation(format!(
                "{date} is before the next unaired day {}",
                self.next_day
            )));
        }
        while self.next_day < date {
            let day = self.next_day;
            if let Err(err) = self.eval(day) {
                if !err.is_day_scoped() {
                    return Err(err);
                }
                tracing::warn!(%day, error = %err, "day skipped during replay");
            }
        }
        self.eval(date)
    }

    fn eval(&mut self, date: NaiveDate) -> TelecastResult<DayRun> {
        self.next_day = date
            .succ_opt()
            .ok_or_else(|| TelecastError::evaluation(format!("no day after {date}")))?;
        run(&self.program, &mut self.pools, &self.durations, None, Some(date))
    }
}
