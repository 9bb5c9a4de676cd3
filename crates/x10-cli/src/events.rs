//! Command-line event syntax
//!
//! One argument per event:
//!
//! ```text
//! A1                      address unit 1 of house A
//! A:on                    function
//! A:dim:0.25              brightness function with a level
//! A:extended_code:0x01:0x31
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use x10_core::{FunctionCode, FunctionKind, HouseCode, UnitCode, X10Event};

/// Parse one event argument
pub fn parse_event(arg: &str) -> Result<X10Event> {
    let mut parts = arg.split(':');
    let head = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    if rest.is_empty() {
        return parse_address(head);
    }

    let house: HouseCode = head.parse()?;
    let function: FunctionCode = rest[0].parse()?;
    let args = &rest[1..];
    let event = match function.kind() {
        FunctionKind::Basic => {
            expect_args(arg, args, 0)?;
            X10Event::function(house, function)?
        }
        FunctionKind::Brightness => {
            expect_args(arg, args, 1)?;
            let level: f64 = args[0]
                .parse()
                .with_context(|| format!("invalid level '{}'", args[0]))?;
            X10Event::brightness(house, function, level)?
        }
        FunctionKind::Extended => {
            expect_args(arg, args, 2)?;
            X10Event::extended(house, parse_byte(args[0])?, parse_byte(args[1])?)
        }
    };
    Ok(event)
}

fn parse_address(arg: &str) -> Result<X10Event> {
    let mut chars = arg.chars();
    let letter = chars
        .next()
        .ok_or_else(|| anyhow!("empty event"))?
        .to_string();
    let house: HouseCode = letter.parse()?;
    let unit: UnitCode = chars.as_str().parse()?;
    Ok(X10Event::address(house, unit))
}

fn expect_args(arg: &str, args: &[&str], count: usize) -> Result<()> {
    if args.len() != count {
        bail!("'{}' takes {} argument(s), got {}", arg, count, args.len());
    }
    Ok(())
}

fn parse_byte(s: &str) -> Result<u8> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("invalid byte '{}'", s))
}

/// Parse a local time as `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
pub fn parse_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("invalid time '{}'", s))
}
