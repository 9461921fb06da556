//! Parsed netlist representation.

use std::collections::HashMap;

/// A complete parsed netlist: element definitions in file order.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    /// All element definitions
    pub elements: Vec<ElementDef>,
}

impl Netlist {
    /// Create a new empty netlist.
    pub fn new() -> Self {
        Self::default()
    }
}

/// One element line of the netlist.
#[derive(Debug, Clone)]
pub struct ElementDef {
    /// Element type, selected by the first character of the name
    pub element_type: ElementType,
    /// Element name (shared by all windings of one transformer)
    pub name: String,
    /// Terminal nodes `[n1, n2]`
    pub nodes: [usize; 2],
    /// `key=value` parameters, keys exactly as written
    pub params: HashMap<String, f64>,
    /// Source line number for error reporting
    pub line: usize,
}

impl ElementDef {
    /// Look up a parameter.
    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }

    /// Whether a parameter was given.
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
}

/// Element types supported by the netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Resistor (`R`)
    Resistor,
    /// Capacitor with series resistance (`C`)
    Capacitor,
    /// Inductor (`L`)
    Inductor,
    /// Externally controlled switch (`S`)
    Switch,
    /// Voltage source behind a series resistance (`V`)
    VoltageSource,
    /// Ideal threshold diode (`D`)
    Diode,
    /// Exponential-law diode (`d`)
    ShockleyDiode,
    /// Flux-linked transformer winding (`T`)
    Transformer,
    /// Algebraic transformer winding (`X`)
    TransformerDirect,
}

impl ElementType {
    /// Select the element type from the first character of its name.
    /// Case matters: `D` is an ideal diode, `d` a Shockley diode.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'R' => Some(Self::Resistor),
            'C' => Some(Self::Capacitor),
            'L' => Some(Self::Inductor),
            'S' => Some(Self::Switch),
            'V' => Some(Self::VoltageSource),
            'D' => Some(Self::Diode),
            'd' => Some(Self::ShockleyDiode),
            'T' => Some(Self::Transformer),
            'X' => Some(Self::TransformerDirect),
            _ => None,
        }
    }

    /// Keys accepted on a line of this type.
    pub fn allowed_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Resistor | Self::Switch => &["R"],
            Self::Capacitor => &["R", "C", "Vinit"],
            Self::Inductor => &["R", "L", "Iinit"],
            Self::VoltageSource => &["R", "V"],
            Self::Diode => &["R", "diode_threshold", "on_recalc"],
            Self::ShockleyDiode => &["R", "VT", "Is", "Iaccuracy", "Vmax"],
            Self::Transformer | Self::TransformerDirect => {
                &["R", "N", "Lbase", "primary", "Vmin", "Vmax"]
            }
        }
    }

    /// Whether this type is a transformer winding of either kind.
    pub fn is_winding(&self) -> bool {
        matches!(self, Self::Transformer | Self::TransformerDirect)
    }

    /// Human-readable type name for messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Resistor => "resistor",
            Self::Capacitor => "capacitor",
            Self::Inductor => "inductor",
            Self::Switch => "switch",
            Self::VoltageSource => "voltage source",
            Self::Diode => "diode",
            Self::ShockleyDiode => "Shockley diode",
            Self::Transformer => "transformer",
            Self::TransformerDirect => "direct transformer",
        }
    }
}
