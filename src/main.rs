use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use regex_dfa_transformer::to_automaton;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <input.txt> <output.csv>", args[0]);
    }

    let input = fs::read_to_string(&args[1]).with_context(|| format!("reading {}", args[1]))?;
    let regex = input.lines().next().unwrap_or_default();

    let automaton =
        to_automaton(regex).with_context(|| format!("converting regex {regex:?}"))?;

    fs::write(&args[2], automaton.to_table())
        .with_context(|| format!("writing {}", args[2]))?;
    Ok(())
}
