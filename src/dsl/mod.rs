//! Schedule DSL.
//!
//! A schedule is line oriented. Top-level lines set parameters (`start_hour 11`), declare pools
//! (`pool Videos/Cartoons --shuffled`) or open a block (`saturday:`). Indented lines after a block
//! header form its body; each body line holds `;`-separated statements:
//!
//! ```text
//! pool Cartoons --shuffled
//! pool Ads --randomized --memory 5
//!
//! break:
//!   play Ads 2 --suppress
//!
//! default:
//!   play Cartoons --until 14
//!   repeat 3 break
//! ```
//!
//! Weekday blocks that are not defined fall back to `weekday`/`weekend`, then `default`.

pub(crate) mod ast;
pub(crate) mod lexer;
pub(crate) mod parser;
pub(crate) mod program;
