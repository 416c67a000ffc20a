use std::collections::BTreeMap;

use crate::dsl::ast::{Block, Instruction, Param, PlayOpts, PoolDecl, Statement, Strategy, Until};
use crate::dsl::lexer::{has_placeholder, lex_line};
use crate::dsl::program::Program;
use crate::foundation::error::{TelecastError, TelecastResult};
use crate::foundation::time::{WEEKDAYS, weekday_block_name, weekday_class_name};

pub(crate) const CATCH_ALL_BLOCK: &str = "default";

#[tracing::instrument(skip(src), fields(bytes = src.len()))]
pub(crate) fn parse_program(src: &str) -> TelecastResult<Program> {
    let mut params: BTreeMap<String, Param> = BTreeMap::new();
    let mut pools: BTreeMap<String, PoolDecl> = BTreeMap::new();
    let mut blocks: BTreeMap<String, Block> = BTreeMap::new();
    let mut shared_memory: BTreeMap<String, usize> = BTreeMap::new();
    let mut current: Option<Block> = None;

    for (idx, raw) in src.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indented = raw.starts_with([' ', '\t']);

        if !indented && let Some(done) = current.take() {
            insert_block(&mut blocks, done)?;
        }

        if let Some(name) = trimmed.strip_suffix(':') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(TelecastError::parse(
                    line_no,
                    format!("invalid block name '{name}'"),
                ));
            }
            if let Some(done) = current.take() {
                insert_block(&mut blocks, done)?;
            }
            current = Some(Block {
                name: name.to_owned(),
                line: line_no,
                statements: Vec::new(),
            });
            continue;
        }

        let statements = lex_line(trimmed, line_no)?;
        match current.as_mut() {
            Some(block) => {
                for tokens in statements {
                    block.statements.push(make_statement(tokens, line_no)?);
                }
            }
            None => {
                for tokens in statements {
                    parse_top_level(
                        &tokens,
                        line_no,
                        &mut params,
                        &mut pools,
                        &mut shared_memory,
                    )?;
                }
            }
        }
    }
    if let Some(done) = current.take() {
        insert_block(&mut blocks, done)?;
    }

    resolve_weekdays(&mut blocks)?;

    tracing::debug!(
        pools = pools.len(),
        blocks = blocks.len(),
        params = params.len(),
        "parsed schedule"
    );
    Ok(Program::from_parts(params, pools, blocks))
}

fn insert_block(blocks: &mut BTreeMap<String, Block>, block: Block) -> TelecastResult<()> {
    if let Some(prev) = blocks.get(&block.name) {
        return Err(TelecastError::parse(
            block.line,
            format!(
                "block '{}' already defined at line {}",
                block.name, prev.line
            ),
        ));
    }
    blocks.insert(block.name.clone(), block);
    Ok(())
}

/// Fill every weekday name: weekday → `weekday`/`weekend` → `default`.
fn resolve_weekdays(blocks: &mut BTreeMap<String, Block>) -> TelecastResult<()> {
    for day in WEEKDAYS {
        let name = weekday_block_name(day);
        if blocks.contains_key(name) {
            continue;
        }
        let class = weekday_class_name(day);
        let fallback = blocks
            .get(class)
            .or_else(|| blocks.get(CATCH_ALL_BLOCK))
            .cloned()
            .ok_or_else(|| {
                TelecastError::parse(
                    0,
                    format!("no block for {name} (define {name}, {class} or {CATCH_ALL_BLOCK})"),
                )
            })?;
        tracing::trace!(day = name, from = %fallback.name, "weekday fallback");
        blocks.insert(name.to_owned(), fallback);
    }
    Ok(())
}

fn make_statement(tokens: Vec<String>, line: usize) -> TelecastResult<Statement> {
    let compiled = if tokens.iter().any(|t| has_placeholder(t)) {
        None
    } else {
        Some(compile_statement(&tokens, line)?)
    };
    Ok(Statement {
        line,
        tokens,
        compiled,
    })
}

fn parse_top_level(
    tokens: &[String],
    line: usize,
    params: &mut BTreeMap<String, Param>,
    pools: &mut BTreeMap<String, PoolDecl>,
    shared_memory: &mut BTreeMap<String, usize>,
) -> TelecastResult<()> {
    let (key, rest) = tokens
        .split_first()
        .ok_or_else(|| TelecastError::parse(line, "empty statement"))?;
    match key.as_str() {
        "start_hour" => {
            let [v] = rest else {
                return Err(TelecastError::parse(line, "start_hour expects one value"));
            };
            let hour: i64 = parse_num(v, "start_hour", line)?;
            if !(0..24).contains(&hour) {
                return Err(TelecastError::parse(
                    line,
                    format!("start_hour {hour} is outside 0..=23"),
                ));
            }
            params.insert(key.clone(), Param::Int(hour));
        }
        "pool" => {
            let decl = parse_pool(rest, line)?;
            if let Strategy::Random {
                memory,
                shared_history: Some(shared),
                ..
            } = &decl.strategy
            {
                match shared_memory.get(shared) {
                    Some(&prev) if prev != *memory => {
                        return Err(TelecastError::parse(
                            line,
                            format!(
                                "shared history '{shared}' declared with memory {prev}, not {memory}"
                            ),
                        ));
                    }
                    _ => {
                        shared_memory.insert(shared.clone(), *memory);
                    }
                }
            }
            if pools.contains_key(&decl.name) {
                return Err(TelecastError::parse(
                    line,
                    format!("pool '{}' declared twice", decl.name),
                ));
            }
            pools.insert(decl.name.clone(), decl);
        }
        _ => {
            let value = match rest {
                [] => {
                    return Err(TelecastError::parse(
                        line,
                        format!("parameter '{key}' has no value"),
                    ));
                }
                [single] => Param::Single(single.clone()),
                many => Param::List(many.to_vec()),
            };
            params.insert(key.clone(), value);
        }
    }
    Ok(())
}

/// Iterates `--flag value` / `--flag=value` pairs and positional arguments.
struct Args<'a> {
    tokens: &'a [String],
    pos: usize,
    line: usize,
}

enum Arg<'a> {
    Flag(&'a str, Option<&'a str>),
    Positional(&'a str),
}

impl<'a> Args<'a> {
    fn new(tokens: &'a [String], line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn next_arg(&mut self) -> Option<Arg<'a>> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        match tok.strip_prefix("--") {
            Some(flag) => match flag.split_once('=') {
                Some((name, value)) => Some(Arg::Flag(name, Some(value))),
                None => Some(Arg::Flag(flag, None)),
            },
            None => Some(Arg::Positional(tok.as_str())),
        }
    }

    fn value(&mut self, flag: &str, inline: Option<&'a str>) -> TelecastResult<&'a str> {
        if let Some(v) = inline {
            return Ok(v);
        }
        let v = self
            .tokens
            .get(self.pos)
            .map(String::as_str)
            .ok_or_else(|| TelecastError::parse(self.line, format!("--{flag} needs a value")))?;
        self.pos += 1;
        Ok(v)
    }

    fn no_value(&self, flag: &str, inline: Option<&str>) -> TelecastResult<()> {
        match inline {
            Some(_) => Err(TelecastError::parse(
                self.line,
                format!("--{flag} takes no value"),
            )),
            None => Ok(()),
        }
    }
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str, line: usize) -> TelecastResult<T> {
    s.parse()
        .map_err(|_| TelecastError::parse(line, format!("invalid {what} '{s}'")))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
    Sequential,
    Shuffled,
    Random,
}

pub(crate) fn parse_pool(tokens: &[String], line: usize) -> TelecastResult<PoolDecl> {
    let mut args = Args::new(tokens, line);
    let mut name: Option<&str> = None;
    let mut kind = StrategyKind::Sequential;
    let mut kind_flag: Option<&str> = None;
    let mut memory: Option<usize> = None;
    let mut seed: Option<String> = None;
    let mut offset: Option<u64> = None;
    let mut shared: Option<String> = None;

    while let Some(arg) = args.next_arg() {
        match arg {
            Arg::Positional(p) => {
                if name.is_some() {
                    return Err(TelecastError::parse(
                        line,
                        format!("unexpected pool argument '{p}'"),
                    ));
                }
                name = Some(p);
            }
            Arg::Flag(f @ ("shuffled" | "randomized"), inline) => {
                args.no_value(f, inline)?;
                let wanted = if f == "shuffled" {
                    StrategyKind::Shuffled
                } else {
                    StrategyKind::Random
                };
                if let Some(prev) = kind_flag
                    && prev != f
                {
                    return Err(TelecastError::parse(
                        line,
                        format!("--{prev} and --{f} are mutually exclusive"),
                    ));
                }
                kind_flag = Some(f);
                kind = wanted;
            }
            Arg::Flag("memory", inline) => {
                memory = Some(parse_num(args.value("memory", inline)?, "--memory", line)?);
            }
            Arg::Flag("seed", inline) => seed = Some(args.value("seed", inline)?.to_owned()),
            Arg::Flag("offset", inline) => {
                offset = Some(parse_num(args.value("offset", inline)?, "--offset", line)?);
            }
            Arg::Flag("shared-history", inline) => {
                shared = Some(args.value("shared-history", inline)?.to_owned());
            }
            Arg::Flag(other, _) => {
                return Err(TelecastError::parse(
                    line,
                    format!("unknown pool flag --{other}"),
                ));
            }
        }
    }

    let name = name.ok_or_else(|| TelecastError::parse(line, "pool requires a file argument"))?;
    let source = match name.split_once('#') {
        Some((path, _fragment)) => path,
        None => name,
    };
    if source.is_empty() {
        return Err(TelecastError::parse(line, "pool path is empty"));
    }
    let seed = seed.unwrap_or_else(|| source.to_owned());

    let strategy = match kind {
        StrategyKind::Sequential => {
            warn_unused(name, "sequential", &[
                ("memory", memory.is_some()),
                ("shared-history", shared.is_some()),
            ]);
            Strategy::Sequential {
                offset: offset.unwrap_or(0),
            }
        }
        StrategyKind::Shuffled => {
            warn_unused(name, "shuffled", &[
                ("memory", memory.is_some()),
                ("offset", offset.is_some()),
                ("shared-history", shared.is_some()),
            ]);
            Strategy::Shuffled { seed }
        }
        StrategyKind::Random => {
            warn_unused(name, "randomized", &[("offset", offset.is_some())]);
            Strategy::Random {
                seed,
                memory: memory.unwrap_or(0),
                shared_history: shared,
            }
        }
    };

    Ok(PoolDecl {
        name: name.to_owned(),
        source: source.to_owned(),
        strategy,
    })
}

fn warn_unused(pool: &str, strategy: &str, flags: &[(&str, bool)]) {
    for (flag, set) in flags {
        if *set {
            tracing::warn!(pool, strategy, flag = *flag, "pool flag has no effect");
        }
    }
}

/// Compile one block statement. Also used at evaluation time after `$N` substitution.
pub(crate) fn compile_statement(tokens: &[String], line: usize) -> TelecastResult<Instruction> {
    let (cmd, rest) = tokens
        .split_first()
        .ok_or_else(|| TelecastError::parse(line, "empty statement"))?;
    match cmd.as_str() {
        "play" => parse_play(rest, line).map(Instruction::Play),
        "repeat" => {
            let (count, inner) = rest
                .split_first()
                .ok_or_else(|| TelecastError::parse(line, "repeat needs a count"))?;
            let count: u64 = parse_num(count, "repeat count", line)?;
            if inner.is_empty() {
                return Err(TelecastError::parse(line, "repeat needs a statement"));
            }
            Ok(Instruction::Repeat(
                count,
                Box::new(compile_statement(inner, line)?),
            ))
        }
        "print" => Ok(Instruction::Print(rest.join(" "))),
        "file" => match rest {
            [path] => Ok(Instruction::File(path.clone())),
            _ => Err(TelecastError::parse(line, "file expects exactly one path")),
        },
        "oneof" => {
            if rest.is_empty() {
                return Err(TelecastError::parse(line, "oneof needs at least one block"));
            }
            Ok(Instruction::OneOf(rest.to_vec()))
        }
        _ => Ok(Instruction::Invoke {
            name: cmd.clone(),
            args: rest.to_vec(),
        }),
    }
}

fn parse_play(tokens: &[String], line: usize) -> TelecastResult<PlayOpts> {
    let mut args = Args::new(tokens, line);
    let mut opts: Option<PlayOpts> = None;
    let mut count_seen = false;
    let mut pending: Vec<(&str, Option<&str>)> = Vec::new();

    while let Some(arg) = args.next_arg() {
        match arg {
            Arg::Positional(p) => match opts.as_mut() {
                None => opts = Some(PlayOpts::new(p)),
                Some(o) if !count_seen => {
                    o.repeat = parse_num(p, "play count", line)?;
                    count_seen = true;
                }
                Some(_) => {
                    return Err(TelecastError::parse(
                        line,
                        format!("unexpected play argument '{p}'"),
                    ));
                }
            },
            Arg::Flag(f @ ("suppress" | "as-block"), inline) => {
                args.no_value(f, inline)?;
                pending.push((f, None));
            }
            Arg::Flag(f @ ("repeat" | "until" | "ignore" | "min" | "max"), inline) => {
                let v = args.value(f, inline)?;
                pending.push((f, Some(v)));
            }
            Arg::Flag(other, _) => {
                return Err(TelecastError::parse(
                    line,
                    format!("unknown play flag --{other}"),
                ));
            }
        }
    }

    let mut opts = opts.ok_or_else(|| TelecastError::parse(line, "play requires a pool"))?;
    for (flag, value) in pending {
        let v = value.unwrap_or_default();
        match flag {
            "suppress" => opts.suppress = true,
            "as-block" => opts.as_block = true,
            "repeat" => opts.repeat = parse_num(v, "--repeat", line)?,
            "until" => opts.until = Some(parse_until(v, line)?),
            "ignore" => opts.ignore = parse_num(v, "--ignore", line)?,
            "min" => opts.min = parse_num(v, "--min", line)?,
            "max" => opts.max = Some(parse_num(v, "--max", line)?),
            _ => unreachable!("flag list is closed above"),
        }
    }
    Ok(opts)
}

fn parse_until(v: &str, line: usize) -> TelecastResult<Until> {
    if let Some(m) = v.strip_prefix(':') {
        let minutes: u64 = parse_num(m, "--until boundary", line)?;
        if minutes == 0 {
            return Err(TelecastError::parse(line, "--until :0 is not a boundary"));
        }
        return Ok(Until::Boundary { minutes });
    }
    let hour: f64 = parse_num(v, "--until hour", line)?;
    if !hour.is_finite() {
        return Err(TelecastError::parse(line, format!("invalid --until hour '{v}'")));
    }
    Ok(Until::Hour(hour))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_owned).collect()
    }

    const MINIMAL: &str = "default:\n  print hi\n";

    #[test]
    fn top_level_params_and_start_hour() {
        let p = parse_program(&format!("start_hour 9\nmarquee hello\ntags a b c\n{MINIMAL}"))
            .unwrap();
        assert_eq!(p.start_hour(), 9);
        assert_eq!(p.param("marquee"), Some(&Param::Single("hello".into())));
        assert_eq!(
            p.param("tags"),
            Some(&Param::List(vec!["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn blocks_close_on_unindented_line() {
        let src = "default:\n  print a\n\tprint b; print c\nstart_hour 12\nextra:\n  print d\n";
        let p = parse_program(src).unwrap();
        assert_eq!(p.block("default").unwrap().statements.len(), 3);
        assert_eq!(p.block("extra").unwrap().statements.len(), 1);
        assert_eq!(p.start_hour(), 12);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let src = "# header\n\ndefault:\n  # inside\n  print a\n\n  print b\n";
        let p = parse_program(src).unwrap();
        assert_eq!(p.block("default").unwrap().statements.len(), 2);
    }

    #[test]
    fn weekday_fallback_chain() {
        let src = "default:\n  print d\nweekend:\n  print we\nfriday:\n  print fri\n";
        let p = parse_program(src).unwrap();
        let first = |n: &str| p.block(n).unwrap().statements[0].source();
        assert_eq!(first("friday"), "print fri");
        assert_eq!(first("saturday"), "print we");
        assert_eq!(first("sunday"), "print we");
        assert_eq!(first("monday"), "print d");
    }

    #[test]
    fn missing_weekday_resolution_is_a_parse_error() {
        let err = parse_program("weekday:\n  print x\n").unwrap_err();
        assert!(err.to_string().contains("no block for saturday"));
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let err = parse_program("default:\n  print a\ndefault:\n  print b\n").unwrap_err();
        assert!(err.to_string().contains("already defined at line 1"));
    }

    #[test]
    fn pool_strategies() {
        let d = parse_pool(&toks("Videos/Cartoons"), 1).unwrap();
        assert_eq!(d.strategy, Strategy::Sequential { offset: 0 });
        assert_eq!(d.source, "Videos/Cartoons");

        let d = parse_pool(&toks("Shows#late --shuffled"), 1).unwrap();
        assert_eq!(d.name, "Shows#late");
        assert_eq!(d.source, "Shows");
        assert_eq!(d.strategy, Strategy::Shuffled { seed: "Shows".into() });

        let d = parse_pool(&toks("Ads --randomized --memory 4 --seed x --shared-history ads"), 1)
            .unwrap();
        assert_eq!(
            d.strategy,
            Strategy::Random {
                seed: "x".into(),
                memory: 4,
                shared_history: Some("ads".into()),
            }
        );

        let d = parse_pool(&toks("Movies --offset=3"), 1).unwrap();
        assert_eq!(d.strategy, Strategy::Sequential { offset: 3 });
    }

    #[test]
    fn pool_errors() {
        for bad in [
            "",
            "Shows --bogus",
            "Shows --memory",
            "Shows --memory lots --randomized",
            "Shows --shuffled --randomized",
            "A B",
        ] {
            assert!(
                matches!(parse_pool(&toks(bad), 7), Err(TelecastError::Parse { line: 7, .. })),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn shared_history_memory_must_agree() {
        let src = format!(
            "pool A --randomized --memory 2 --shared-history h\n\
             pool B --randomized --memory 3 --shared-history h\n{MINIMAL}"
        );
        let err = parse_program(&src).unwrap_err();
        assert!(matches!(err, TelecastError::Parse { line: 2, .. }));
    }

    #[test]
    fn play_options() {
        let Instruction::Play(o) =
            compile_statement(&toks("play Cartoons --until 14 --min 2 --max 5 --suppress"), 1)
                .unwrap()
        else {
            panic!("expected play");
        };
        assert_eq!(o.pool, "Cartoons");
        assert_eq!(o.until, Some(Until::Hour(14.0)));
        assert_eq!((o.min, o.max, o.suppress), (2, Some(5), true));

        let Instruction::Play(o) =
            compile_statement(&toks("play Ads 3 --until :30 --ignore 2"), 1).unwrap()
        else {
            panic!("expected play");
        };
        assert_eq!(o.repeat, 3);
        assert_eq!(o.until, Some(Until::Boundary { minutes: 30 }));
        assert_eq!(o.ignore, 2.0);
    }

    #[test]
    fn repeat_wraps_inner_statement() {
        let i = compile_statement(&toks("repeat 3 play Ads"), 1).unwrap();
        let Instruction::Repeat(3, inner) = i else {
            panic!("expected repeat");
        };
        assert!(matches!(*inner, Instruction::Play(_)));
    }

    #[test]
    fn other_commands_are_invocations() {
        assert_eq!(
            compile_statement(&toks("greet world"), 1).unwrap(),
            Instruction::Invoke {
                name: "greet".into(),
                args: vec!["world".into()],
            }
        );
    }

    #[test]
    fn placeholder_statements_are_compiled_lazily() {
        let p = parse_program("greet:\n  print hello $0\ndefault:\n  greet world\n").unwrap();
        assert!(p.block("greet").unwrap().statements[0].compiled.is_none());
        assert!(p.block("default").unwrap().statements[0].compiled.is_some());
    }

    #[test]
    fn bad_play_reports_line() {
        let err = parse_program("default:\n  print ok\n  play Shows --until soon\n").unwrap_err();
        assert!(matches!(err, TelecastError::Parse { line: 3, .. }));
    }
}
