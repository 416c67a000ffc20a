use std::borrow::Cow;

use chrono::NaiveDate;

use crate::catalog::DurationTable;
use crate::dsl::ast::{Block, Instruction, PlayOpts, Statement};
use crate::dsl::lexer::substitute;
use crate::dsl::parser::compile_statement;
use crate::dsl::program::Program;
use crate::eval::state::ProgramState;
use crate::eval::until::cutoff_secs;
use crate::eval::{DayRun, EpgSubject, PlaylistItem, RawEpgEntry};
use crate::foundation::error::{TelecastError, TelecastResult};
use crate::foundation::time::{SECS_PER_HOUR, block_name_for_date};
use crate::pool::PoolSet;

pub const MAX_INVOKE_DEPTH: usize = 64;

/// Upper bound on items a single `play --until` may commit.
const MAX_UNTIL_ITEMS: u64 = 100_000;

const FILE_GROUP: &str = "file";

/// Evaluate `entry` (or the weekday block of `date`) into a timed playlist.
///
/// Pool cursors in `pools` advance as items are committed; everything else is read-only. The same
/// inputs from the same pool state always produce the same [`DayRun`].
#[tracing::instrument(skip(program, pools, durations))]
pub fn run(
    program: &Program,
    pools: &mut PoolSet,
    durations: &DurationTable,
    entry: Option<&str>,
    date: Option<NaiveDate>,
) -> TelecastResult<DayRun> {
    let entry = match (entry, date) {
        (Some(e), _) => e,
        (None, Some(d)) => block_name_for_date(d),
        (None, None) => {
            return Err(TelecastError::evaluation(
                "no entry block and no date to pick a weekday block",
            ));
        }
    };
    let block = program
        .block(entry)
        .ok_or_else(|| TelecastError::UndefinedBlock {
            name: entry.to_owned(),
            statement: format!("<entry {entry}>"),
            at_secs: 0,
        })?;

    let mut interp = Interpreter {
        program,
        pools,
        durations,
        date,
        start_hour: program.start_hour(),
        out: DayRun {
            entry: entry.to_owned(),
            date,
            start_hour: program.start_hour(),
            ..DayRun::default()
        },
    };
    let mut state = ProgramState::new();
    interp.exec_block(block, &[], &mut state)?;

    let out = interp.out;
    tracing::debug!(
        items = out.playlist.len(),
        total_secs = out.total_secs(),
        epg = out.epg.len(),
        "day evaluated"
    );
    Ok(out)
}

struct Interpreter<'a> {
    program: &'a Program,
    pools: &'a mut PoolSet,
    durations: &'a DurationTable,
    date: Option<NaiveDate>,
    start_hour: u32,
    out: DayRun,
}

impl Interpreter<'_> {
    fn exec_block(
        &mut self,
        block: &Block,
        args: &[String],
        state: &mut ProgramState,
    ) -> TelecastResult<()> {
        if state.depth > MAX_INVOKE_DEPTH {
            return Err(TelecastError::evaluation(format!(
                "block '{}' nested deeper than {MAX_INVOKE_DEPTH} invocations",
                block.name
            )));
        }
        for stmt in &block.statements {
            let Some(instr) = resolve(stmt, args)? else {
                continue;
            };
            self.exec(&instr, stmt, state)?;
        }
        Ok(())
    }

    fn exec(
        &mut self,
        instr: &Instruction,
        stmt: &Statement,
        state: &mut ProgramState,
    ) -> TelecastResult<()> {
        match instr {
            Instruction::Play(opts) => self.play(opts, state),
            Instruction::Repeat(count, inner) => {
                for _ in 0..*count {
                    self.exec(inner, stmt, state)?;
                }
                Ok(())
            }
            Instruction::Invoke { name, args } => self.invoke(name, args, stmt, state),
            Instruction::Print(text) => {
                tracing::info!(at_secs = state.now, "{text}");
                self.out.log.push(text.clone());
                Ok(())
            }
            Instruction::File(path) => {
                let path = self.pools.resolve_file(path);
                let duration = self.durations.duration_of(&path);
                self.commit(path, duration, Some(FILE_GROUP), state);
                Ok(())
            }
            Instruction::OneOf(names) => {
                let pick = &names[self.pools.choose(names.len())];
                self.invoke(pick, &[], stmt, state)
            }
        }
    }

    fn invoke(
        &mut self,
        name: &str,
        args: &[String],
        stmt: &Statement,
        state: &mut ProgramState,
    ) -> TelecastResult<()> {
        let program = self.program;
        let block = program
            .block(name)
            .ok_or_else(|| TelecastError::UndefinedBlock {
                name: name.to_owned(),
                statement: stmt.source(),
                at_secs: state.now,
            })?;
        state.depth += 1;
        let res = self.exec_block(block, args, state);
        state.depth -= 1;
        res
    }

    fn play(&mut self, opts: &PlayOpts, state: &mut ProgramState) -> TelecastResult<()> {
        let started_at = state.now;
        let epg_mark = self.out.epg.len();
        let item_group = (!opts.suppress && !opts.as_block).then_some(opts.pool.as_str());
        let mut count = 0u64;

        match &opts.until {
            None => {
                for _ in 0..opts.repeat {
                    let path = self.select(&opts.pool)?;
                    let duration = self.durations.duration_of(&path);
                    self.pools.advance(&opts.pool)?;
                    self.commit(path, duration, item_group, state);
                    count += 1;
                }
            }
            Some(until) => {
                let target = cutoff_secs(until, state.now, self.start_hour, opts.ignore);
                loop {
                    if opts.max.is_some_and(|max| count >= max) {
                        break;
                    }
                    let path = self.select(&opts.pool)?;
                    let duration = self.durations.duration_of(&path);
                    if count >= opts.min && (state.now + duration) as f64 > target {
                        break;
                    }
                    if count >= MAX_UNTIL_ITEMS {
                        return Err(TelecastError::evaluation(format!(
                            "play {} --until committed {MAX_UNTIL_ITEMS} items without reaching \
                             the cutoff",
                            opts.pool
                        )));
                    }
                    self.pools.advance(&opts.pool)?;
                    self.commit(path, duration, item_group, state);
                    count += 1;
                }
                tracing::trace!(pool = %opts.pool, cutoff = target, count, "until window filled");
            }
        }

        if opts.as_block && !opts.suppress && count > 0 {
            self.out.epg.insert(
                epg_mark,
                RawEpgEntry {
                    offset_secs: self.wall_clock(started_at),
                    subject: EpgSubject::Pool {
                        label: opts.pool.clone(),
                    },
                },
            );
        }
        Ok(())
    }

    /// Current in-season candidate of `pool`.
    fn select(&mut self, pool: &str) -> TelecastResult<String> {
        let path = self.pools.select(pool, self.date)?;
        tracing::trace!(pool, path = %path, "selected");
        Ok(path)
    }

    fn commit(
        &mut self,
        path: String,
        duration_secs: u64,
        epg_group: Option<&str>,
        state: &mut ProgramState,
    ) {
        if let Some(group) = epg_group {
            self.out.epg.push(RawEpgEntry {
                offset_secs: self.wall_clock(state.now),
                subject: EpgSubject::Item {
                    group: group.to_owned(),
                    path: path.clone(),
                },
            });
        }
        self.out.playlist.push(PlaylistItem {
            path,
            start_secs: state.now,
            duration_secs,
        });
        state.now += duration_secs;
    }

    fn wall_clock(&self, at: u64) -> u64 {
        u64::from(self.start_hour) * SECS_PER_HOUR + at
    }
}

/// Instruction for `stmt` after `$N` substitution; `None` if every token was dropped.
fn resolve<'s>(
    stmt: &'s Statement,
    args: &[String],
) -> TelecastResult<Option<Cow<'s, Instruction>>> {
    if let Some(compiled) = &stmt.compiled {
        return Ok(Some(Cow::Borrowed(compiled)));
    }
    let tokens: Vec<String> = stmt
        .tokens
        .iter()
        .filter_map(|t| substitute(t, args))
        .collect();
    if tokens.is_empty() {
        return Ok(None);
    }
    compile_statement(&tokens, stmt.line)
        .map(|i| Some(Cow::Owned(i)))
        .map_err(|e| match e {
            TelecastError::Parse { line, message } => TelecastError::evaluation(format!(
                "line {line}: {message} (after substituting {args:?} into `{}`)",
                stmt.source()
            )),
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;

    fn setup(src: &str, catalog: &StaticCatalog) -> (Program, PoolSet) {
        let program = Program::parse(src).unwrap();
        let pools = PoolSet::build(&program, catalog).unwrap();
        (program, pools)
    }

    fn hour_items(n: usize) -> (Vec<String>, DurationTable) {
        let items: Vec<String> = (0..n).map(|i| format!("x/{i}.mp4")).collect();
        let table = items.iter().map(|p| (p.clone(), 3600)).collect();
        (items, table)
    }

    #[test]
    fn until_stops_at_target_and_honors_max() {
        let (items, table) = hour_items(10);
        let cat = StaticCatalog::new().with_source("X", items);

        let (p, mut pools) = setup("start_hour 11\npool X\ndefault:\n  play X --until 14\n", &cat);
        let run1 = run(&p, &mut pools, &table, Some("default"), None).unwrap();
        assert_eq!(run1.playlist.len(), 3);
        assert_eq!(run1.total_secs(), 10_800);

        let (p, mut pools) =
            setup("start_hour 11\npool X\ndefault:\n  play X --until 14 --max 2\n", &cat);
        let run2 = run(&p, &mut pools, &table, Some("default"), None).unwrap();
        assert_eq!(run2.playlist.len(), 2);
    }

    #[test]
    fn until_plays_min_items_even_past_target() {
        let (items, table) = hour_items(4);
        let cat = StaticCatalog::new().with_source("X", items);
        let (p, mut pools) =
            setup("start_hour 11\npool X\ndefault:\n  play X --until 11 --min 2\n", &cat);
        let r = run(&p, &mut pools, &table, Some("default"), None).unwrap();
        assert_eq!(r.playlist.len(), 2);
    }

    #[test]
    fn item_left_unplayed_by_until_is_next_up() {
        let (items, table) = hour_items(10);
        let cat = StaticCatalog::new().with_source("X", items);
        let src = "start_hour 11\npool X\ndefault:\n  play X --until 12\n  play X\n";
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &table, Some("default"), None).unwrap();
        assert_eq!(r.paths().collect::<Vec<_>>(), vec!["x/0.mp4", "x/1.mp4"]);
    }

    #[test]
    fn macro_arguments_are_substituted_or_dropped() {
        let cat = StaticCatalog::new();
        let src = "greet:\n  print hello $0\ndefault:\n  greet world\n  greet\n";
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap();
        assert_eq!(r.log, vec!["hello world", "hello"]);
    }

    #[test]
    fn optional_flag_argument_is_dropped_whole() {
        let (items, table) = hour_items(10);
        let cat = StaticCatalog::new().with_source("X", items);
        let src = "pool X\nshow:\n  play $0 --max=$1 --until 23\ndefault:\n  show X 1\n  show X\n";
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &table, Some("default"), None).unwrap();
        // First call capped at one item; second fills the rest of the window to 23:00.
        assert_eq!(r.playlist.len(), 12);
    }

    #[test]
    fn undefined_block_reports_statement_and_time() {
        let cat = StaticCatalog::new().with_source("X", ["a.mp4"]);
        let src = "pool X\ndefault:\n  play X\n  nosuch 1 2\n";
        let (p, mut pools) = setup(src, &cat);
        let err = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap_err();
        match err {
            TelecastError::UndefinedBlock {
                name,
                statement,
                at_secs,
            } => {
                assert_eq!(name, "nosuch");
                assert_eq!(statement, "nosuch 1 2");
                assert_eq!(at_secs, crate::catalog::DEFAULT_ITEM_SECS);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unbounded_recursion_is_an_evaluation_error() {
        let cat = StaticCatalog::new();
        let (p, mut pools) = setup("loop:\n  loop\ndefault:\n  loop\n", &cat);
        let err = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap_err();
        assert!(err.is_day_scoped());
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn repeat_redraws_each_iteration() {
        let cat = StaticCatalog::new().with_source("X", ["a.mp4", "b.mp4", "c.mp4"]);
        let (p, mut pools) = setup("pool X\ndefault:\n  repeat 4 play X\n", &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap();
        assert_eq!(
            r.paths().collect::<Vec<_>>(),
            vec!["a.mp4", "b.mp4", "c.mp4", "a.mp4"]
        );
        assert_eq!(r.total_secs(), 4 * crate::catalog::DEFAULT_ITEM_SECS);
    }

    #[test]
    fn epg_entries_follow_suppress_and_as_block() {
        let cat = StaticCatalog::new()
            .with_source("Shows", ["s1.mp4", "s2.mp4"])
            .with_source("Ads", ["ad.mp4"]);
        let src = "start_hour 10\npool Shows\npool Ads\ndefault:\n  play Ads --suppress\n  \
                   play Shows 2 --as-block\n  play Shows\n";
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap();
        assert_eq!(r.playlist.len(), 4);
        assert_eq!(
            r.epg,
            vec![
                RawEpgEntry {
                    offset_secs: 10 * 3600 + 60,
                    subject: EpgSubject::Pool {
                        label: "Shows".into()
                    },
                },
                RawEpgEntry {
                    offset_secs: 10 * 3600 + 180,
                    subject: EpgSubject::Item {
                        group: "Shows".into(),
                        path: "s1.mp4".into()
                    },
                },
            ]
        );
    }

    #[test]
    fn season_gating_skips_out_of_month_items() {
        let cat = StaticCatalog::new().with_source("X", ["a.mp4", "b (xmas).mp4", "c.mp4"]);
        let src = "pool X\ndefault:\n  play X 6\n";
        let june = NaiveDate::from_ymd_opt(2022, 6, 1);
        let december = NaiveDate::from_ymd_opt(2022, 12, 1);

        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), june).unwrap();
        assert!(r.paths().all(|p| !p.contains("xmas")));

        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), december).unwrap();
        assert!(r.paths().any(|p| p.contains("xmas")));
    }

    #[test]
    fn all_out_of_season_is_an_error() {
        let cat = StaticCatalog::new().with_source("X", ["only (halloween).mp4"]);
        let (p, mut pools) = setup("pool X\ndefault:\n  play X\n", &cat);
        let may = NaiveDate::from_ymd_opt(2022, 5, 1);
        let err = run(&p, &mut pools, &DurationTable::new(), Some("default"), may).unwrap_err();
        assert!(err.to_string().contains("in-season"));
    }

    #[test]
    fn season_marker_on_a_folder_gates_its_items() {
        let cat = StaticCatalog::new().with_source(
            "S",
            ["S/Regular/a.mp4", "S/Specials (xmas)/b.mp4", "S/Specials (xmas)/c.mp4"],
        );
        let src = "pool S\ndefault:\n  play S 6\n";
        let june = NaiveDate::from_ymd_opt(2022, 6, 1);
        let december = NaiveDate::from_ymd_opt(2022, 12, 1);

        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), june).unwrap();
        assert_eq!(r.paths().collect::<Vec<_>>(), vec!["S/Regular/a.mp4"; 6]);

        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), december).unwrap();
        assert_eq!(r.paths().filter(|p| p.contains("Specials")).count(), 4);
    }

    #[test]
    fn random_pool_repeats_in_season_items_before_failing() {
        let cat = StaticCatalog::new().with_source(
            "R",
            ["r/a.mp4", "r/b.mp4", "r/x1 (xmas).mp4", "r/x2 (xmas).mp4"],
        );
        let src = "pool R --randomized --memory 3\ndefault:\n  play R 12\n";
        let june = NaiveDate::from_ymd_opt(2022, 6, 1);
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), june).unwrap();
        assert_eq!(r.playlist.len(), 12);
        assert!(r.paths().all(|p| p == "r/a.mp4" || p == "r/b.mp4"));
    }

    #[test]
    fn file_resolves_against_media_root_and_uses_its_duration() {
        let root = std::path::Path::new("media");
        let program = Program::parse("default:\n  file Bumpers/ident.mp4\n").unwrap();
        let mut pools = PoolSet::build(&program, &crate::catalog::FsCatalog::new(root)).unwrap();
        let csv = "file,duration\nBumpers/ident.mp4,30\n";
        let table = DurationTable::from_csv_reader(csv.as_bytes(), root).unwrap();

        let r = run(&program, &mut pools, &table, Some("default"), None).unwrap();
        let expected = root.join("Bumpers/ident.mp4");
        assert_eq!(r.playlist.len(), 1);
        assert_eq!(r.playlist[0].path, expected.to_string_lossy());
        assert_eq!(r.playlist[0].duration_secs, 30);
    }

    #[test]
    fn date_selects_weekday_block() {
        let cat = StaticCatalog::new();
        let src = "default:\n  print plain\nsaturday:\n  print cartoons\n";
        let (p, mut pools) = setup(src, &cat);
        let sat = NaiveDate::from_ymd_opt(2021, 4, 10);
        let r = run(&p, &mut pools, &DurationTable::new(), None, sat).unwrap();
        assert_eq!(r.entry, "saturday");
        assert_eq!(r.log, vec!["cartoons"]);
        assert!(run(&p, &mut pools, &DurationTable::new(), None, None).is_err());
    }

    #[test]
    fn file_and_oneof_builtins() {
        let cat = StaticCatalog::new();
        let src = "seed fixed\na:\n  file one.png\nb:\n  file two.png\ndefault:\n  \
                   oneof a b; oneof a b; oneof a b; oneof a b\n";
        let (p, mut pools) = setup(src, &cat);
        let r = run(&p, &mut pools, &DurationTable::new(), Some("default"), None).unwrap();
        assert_eq!(r.playlist.len(), 4);
        assert!(r.paths().all(|p| p == "one.png" || p == "two.png"));

        let (p2, mut pools2) = setup(src, &cat);
        let again = run(&p2, &mut pools2, &DurationTable::new(), Some("default"), None).unwrap();
        assert_eq!(r, again);
    }
}
