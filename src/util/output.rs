#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use serde::Serialize;

pub fn print_output(printed_output: &str) {
    println!("{}", printed_output);
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

pub fn print_json_output<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Error serializing JSON")?
    );
    Ok(())
}
