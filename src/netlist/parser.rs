//! Line parser for the netlist format.

use std::collections::HashMap;

use super::ast::{ElementDef, ElementType, Netlist};
use crate::error::{SimError, Result};

/// Parser for netlist text.
pub struct Parser<'a> {
    input: &'a str,
}

impl<'a> Parser<'a> {
    /// Create a new parser over the given text.
    pub fn new(input: &'a str) -> Self {
        Self { input }
    }

    /// Parse the entire netlist.
    pub fn parse(&mut self) -> Result<Netlist> {
        let mut netlist = Netlist::new();

        for (idx, raw) in self.input.lines().enumerate() {
            let line = idx + 1;
            let content = strip_comment(raw);
            if content.trim().is_empty() {
                continue;
            }
            netlist.elements.push(parse_element(content, line)?);
        }

        Ok(netlist)
    }
}

/// Drop everything from the first `#` on.
fn strip_comment(raw: &str) -> &str {
    match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

fn parse_element(content: &str, line: usize) -> Result<ElementDef> {
    let mut tokens = content.split_whitespace();
    let (Some(first), Some(second), Some(name)) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(SimError::parse(
            line,
            format!("invalid line: '{}'", content.trim()),
        ));
    };

    let n1 = parse_node(first, line)?;
    let n2 = parse_node(second, line)?;
    if n1 == n2 {
        return Err(SimError::parse(
            line,
            format!("two same nodes {} {} for {}", n1, n2, name),
        ));
    }

    // `name` is non-empty because split_whitespace never yields empty tokens
    let prefix = name.chars().next().unwrap_or('?');
    let element_type =
        ElementType::from_prefix(prefix).ok_or_else(|| SimError::UnknownElementType {
            name: name.to_string(),
            line,
        })?;

    let mut params = HashMap::new();
    for token in tokens {
        let (key, text) = token.split_once('=').ok_or_else(|| {
            SimError::parse(line, format!("extra token '{}' has no equals sign", token))
        })?;

        if !element_type.allowed_keys().contains(&key) {
            return Err(SimError::invalid_parameter(
                name,
                key,
                format!("not a parameter of a {}", element_type.describe()),
            ));
        }

        let value = parse_param(name, key, text)?;
        params.insert(key.to_string(), value);
    }

    Ok(ElementDef {
        element_type,
        name: name.to_string(),
        nodes: [n1, n2],
        params,
        line,
    })
}

fn parse_node(text: &str, line: usize) -> Result<usize> {
    text.parse::<u32>()
        .map(|n| n as usize)
        .map_err(|_| SimError::parse(line, format!("not an int node: '{}'", text)))
}

/// Parse and range-check a single parameter value.
fn parse_param(element: &str, key: &str, text: &str) -> Result<f64> {
    // Flags take exactly 0 or 1
    if key == "primary" || key == "on_recalc" {
        return match text {
            "0" => Ok(0.0),
            "1" => Ok(1.0),
            _ => Err(SimError::invalid_parameter(
                element,
                key,
                format!("valid values are 0 and 1, got '{}'", text),
            )),
        };
    }

    let value = parse_value(text).ok_or_else(|| {
        SimError::invalid_parameter(element, key, format!("invalid number '{}'", text))
    })?;

    let positive_only = matches!(key, "R" | "C" | "L" | "N" | "Lbase" | "VT" | "Is" | "Iaccuracy");
    if positive_only && value <= 0.0 {
        return Err(SimError::invalid_parameter(
            element,
            key,
            format!("must be positive, got {}", value),
        ));
    }
    if key == "diode_threshold" && value < 0.0 {
        return Err(SimError::invalid_parameter(
            element,
            key,
            format!("must not be negative, got {}", value),
        ));
    }

    Ok(value)
}

/// Parse a numeric value with an optional SI suffix.
///
/// Supported suffixes: p, n, u, m, k/K, M, G
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let last = text.chars().last()?;

    let multiplier = match last {
        'p' => 1e-12,
        'n' => 1e-9,
        'u' => 1e-6,
        'm' => 1e-3,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        _ => 1.0,
    };
    let num_str = if multiplier != 1.0 {
        &text[..text.len() - last.len_utf8()]
    } else {
        text
    };

    let value = num_str.parse::<f64>().ok()? * multiplier;
    value.is_finite().then_some(value)
}
