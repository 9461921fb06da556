//! Probe tracing for the CLI frontend.
//!
//! Probes name a quantity to sample after every step; the samples are
//! written to stdout as one whitespace separated line per step.
//!
//! | Probe | Quantity |
//! |-------|----------|
//! | `v(3)` | voltage of node 3 |
//! | `v(3,2)` | voltage of node 3 against node 2 |
//! | `i(NAME)` | inductor current or voltage source current |
//! | `im(NAME)` | transformer magnetizing current |

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::components::Element;
use crate::error::{Result, SimError};
use crate::netlist::parse_value;
use crate::Simulator;

/// A quantity sampled after every step.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Voltage of a node against ground
    NodeVoltage(usize),
    /// Voltage between two nodes
    Differential(usize, usize),
    /// Current of an inductor or voltage source
    Current(String),
    /// Magnetizing current of a transformer
    Magnetizing(String),
}

impl Probe {
    /// Read the probed quantity from the last solved step.
    pub fn sample(&self, sim: &Simulator) -> Result<f64> {
        match self {
            Probe::NodeVoltage(node) => node_voltage(sim, *node),
            Probe::Differential(a, b) => Ok(node_voltage(sim, *a)? - node_voltage(sim, *b)?),
            Probe::Current(name) => {
                let id = sim.circuit().lookup(name)?;
                match sim.circuit().element(id) {
                    Element::Inductor(_) => sim.inductor_current(name),
                    Element::VoltageSource(_) => sim.voltage_source_current(name),
                    _ => Err(SimError::WrongElementType {
                        name: name.clone(),
                        expected: "inductor or voltage source",
                    }),
                }
            }
            Probe::Magnetizing(name) => sim.transformer_magnetizing_current(name),
        }
    }
}

fn node_voltage(sim: &Simulator, node: usize) -> Result<f64> {
    sim.node_voltage(node)
        .ok_or_else(|| SimError::InvalidSimulationParam {
            message: format!("probe node {} does not exist", node),
        })
}

impl FromStr for Probe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (func, args) = s
            .strip_suffix(')')
            .and_then(|rest| rest.split_once('('))
            .ok_or_else(|| format!("expected v(N), v(N,M), i(NAME) or im(NAME), got '{}'", s))?;
        let args = args.trim();

        let node = |text: &str| {
            text.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid node '{}' in probe '{}'", text.trim(), s))
        };

        match func {
            "v" => match args.split_once(',') {
                Some((a, b)) => Ok(Probe::Differential(node(a)?, node(b)?)),
                None => Ok(Probe::NodeVoltage(node(args)?)),
            },
            "i" if !args.is_empty() => Ok(Probe::Current(args.to_string())),
            "im" if !args.is_empty() => Ok(Probe::Magnetizing(args.to_string())),
            _ => Err(format!("unknown probe '{}'", s)),
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::NodeVoltage(n) => write!(f, "v({})", n),
            Probe::Differential(a, b) => write!(f, "v({},{})", a, b),
            Probe::Current(name) => write!(f, "i({})", name),
            Probe::Magnetizing(name) => write!(f, "im({})", name),
        }
    }
}

/// A sinusoidal drive applied to a voltage source before every step.
#[derive(Debug, Clone, PartialEq)]
pub struct SineDrive {
    pub source: String,
    pub amplitude: f64,
    pub frequency: f64,
}

impl SineDrive {
    /// Source voltage at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        self.amplitude * (2.0 * std::f64::consts::PI * self.frequency * t).sin()
    }
}

impl FromStr for SineDrive {
    type Err = String;

    /// Parse `NAME:AMPLITUDE:FREQUENCY`, values accept unit suffixes.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [source, amplitude, frequency] = parts.as_slice() else {
            return Err(format!("expected NAME:AMPLITUDE:FREQUENCY, got '{}'", s));
        };
        let value = |text: &str| {
            parse_value(text).ok_or_else(|| format!("invalid value '{}' in '{}'", text, s))
        };
        Ok(Self {
            source: source.to_string(),
            amplitude: value(amplitude)?,
            frequency: value(frequency)?,
        })
    }
}

/// Line-oriented sample writer.
pub struct TraceWriter<W: Write> {
    out: W,
    line: String,
}

impl<W: Write> TraceWriter<W> {
    /// Create a new writer over `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: String::with_capacity(256),
        }
    }

    /// Write one `<step> <values...>` line.
    pub fn write_row(&mut self, step: u64, values: &[f64]) -> Result<()> {
        use std::fmt::Write as _;

        self.line.clear();
        let _ = write!(self.line, "{}", step);
        for value in values {
            let _ = write!(self.line, " {:.6e}", value);
        }
        self.line.push('\n');

        self.out.write_all(self.line.as_bytes()).map_err(output_error)
    }

    /// Flush the output stream.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(output_error)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn output_error(e: io::Error) -> SimError {
    SimError::TraceOutputError {
        message: e.to_string(),
    }
}

/// Run `steps` steps, driving sine sources before each step and writing
/// every probe after it.
pub fn run_trace<W: Write>(
    sim: &mut Simulator,
    drives: &[SineDrive],
    probes: &[Probe],
    steps: u64,
    writer: &mut TraceWriter<W>,
) -> Result<()> {
    let mut samples = vec![0.0; probes.len()];

    for _ in 0..steps {
        let t = sim.time();
        for drive in drives {
            sim.set_voltage_source(&drive.source, drive.value_at(t))?;
        }
        sim.advance_step()?;

        for (sample, probe) in samples.iter_mut().zip(probes) {
            *sample = probe.sample(sim)?;
        }
        writer.write_row(sim.steps(), &samples)?;
    }

    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_probes() {
        assert_eq!("v(3)".parse::<Probe>().unwrap(), Probe::NodeVoltage(3));
        assert_eq!("v(3, 2)".parse::<Probe>().unwrap(), Probe::Differential(3, 2));
        assert_eq!("i(L1)".parse::<Probe>().unwrap(), Probe::Current("L1".into()));
        assert_eq!("im(T1)".parse::<Probe>().unwrap(), Probe::Magnetizing("T1".into()));
        assert!("v(x)".parse::<Probe>().is_err());
        assert!("i()".parse::<Probe>().is_err());
        assert!("q(1)".parse::<Probe>().is_err());
        assert!("v3".parse::<Probe>().is_err());
        assert_eq!(Probe::Differential(3, 2).to_string(), "v(3,2)");
    }

    #[test]
    fn test_parse_sine_drive() {
        let drive: SineDrive = "V1:10:50k".parse().unwrap();
        assert_eq!(drive.source, "V1");
        assert_eq!(drive.amplitude, 10.0);
        assert_eq!(drive.frequency, 50e3);
        assert_relative_eq!(drive.value_at(5e-6), 10.0, epsilon = 1e-9);
        assert!("V1:10".parse::<SineDrive>().is_err());
        assert!("V1:ten:50".parse::<SineDrive>().is_err());
    }

    #[test]
    fn test_trace_output() {
        let mut sim = Simulator::from_netlist(
            "\
1 0 V1 V=0 R=1
1 2 R1 R=1
2 0 L1 L=1m
",
            1e-6,
        )
        .unwrap();
        let drives = vec!["V1:1:1k".parse::<SineDrive>().unwrap()];
        let probes = vec![Probe::NodeVoltage(1), Probe::Current("L1".into())];
        let mut writer = TraceWriter::new(Vec::new());
        run_trace(&mut sim, &drives, &probes, 3, &mut writer).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("1 "));
        assert_eq!(lines[2].split_whitespace().count(), 3);
    }

    #[test]
    fn test_probe_errors() {
        let mut sim = Simulator::from_netlist("1 0 V1 V=1 R=1\n1 0 R1 R=1\n", 1e-6).unwrap();
        sim.advance_step().unwrap();
        assert!(Probe::NodeVoltage(5).sample(&sim).is_err());
        assert!(Probe::Current("R1".into()).sample(&sim).is_err());
        assert!(Probe::Magnetizing("T9".into()).sample(&sim).is_err());
        assert_relative_eq!(Probe::Current("V1".into()).sample(&sim).unwrap(), 0.5);
    }
}
