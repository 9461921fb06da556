//! Netlist parser for circuit descriptions.
//!
//! The netlist is line-oriented: one element per line, blank lines and
//! anything after `#` ignored.
//!
//! # Grammar Overview
//!
//! ```text
//! netlist  = { line }
//! line     = [ element ] [ '#' { any_char } ]
//! element  = node node name { key '=' value }
//! node     = digit+
//! value    = number [unit_suffix]
//! unit_suffix = 'p' | 'n' | 'u' | 'm' | 'k' | 'M' | 'G'
//! ```
//!
//! The first character of `name` selects the element type:
//!
//! | Prefix | Element | Keys |
//! |--------|---------|------|
//! | R | Resistor | `R` |
//! | C | Capacitor | `R`, `C`, `Vinit` |
//! | L | Inductor | `L`, `Iinit`, `R` |
//! | S | Switch | `R` |
//! | V | Voltage source | `R`, `V` |
//! | D | Threshold diode | `R`, `diode_threshold`, `on_recalc` |
//! | d | Shockley diode | `R`, `VT`, `Is`, `Iaccuracy`, `Vmax` |
//! | T | Flux-linked transformer winding | `R`, `N`, `Lbase`, `primary`, `Vmin`, `Vmax` |
//! | X | Algebraic transformer winding | `R`, `N`, `Lbase`, `primary`, `Vmin`, `Vmax` |
//!
//! Windings of one transformer share its name; exactly one of them carries
//! `primary=1`.
//!
//! # Example
//!
//! ```text
//! # Resistive divider
//! 1 0 R1 R=10
//! 1 2 R2 R=10
//! 2 0 V1 V=10 R=1e-6
//! ```

mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse_value, Parser};

use crate::error::Result;

/// Parse netlist text.
pub fn parse(input: &str) -> Result<Netlist> {
    Parser::new(input).parse()
}

/// Parse a netlist file.
pub fn parse_file(path: &std::path::Path) -> Result<Netlist> {
    let content =
        std::fs::read_to_string(path).map_err(|e| crate::error::SimError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
    parse(&content)
}
