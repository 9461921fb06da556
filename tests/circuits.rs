//! End-to-end circuit tests.

use approx::assert_relative_eq;
use switchsim_core::{ErrorKind, SimError, Simulator, SimulatorConfig, TopologyBuilder};

fn sim(netlist: &str, dt: f64) -> Simulator {
    Simulator::from_netlist(netlist, dt).expect("netlist should build")
}

fn v(sim: &Simulator, node: usize) -> f64 {
    sim.node_voltage(node).expect("node exists")
}

#[test]
fn resistive_divider() {
    let mut s = sim(
        "\
# Resistive divider
1 0 R1 R=10
1 2 R2 R=10
2 0 V1 V=10 R=1e-6
",
        1e-6,
    );
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 2), 10.0, epsilon = 1e-4);
    assert_relative_eq!(v(&s, 1), 5.0, epsilon = 1e-4);
}

#[test]
fn open_switch_isolates_load() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 2 S1 R=1m
2 0 RL R=10
",
        1e-6,
    );
    assert!(s.set_switch("S1", false).unwrap());
    s.force_recalc().unwrap();
    s.advance_step().unwrap();
    assert!(v(&s, 2).abs() < 1e-6);

    assert!(s.set_switch("S1", true).unwrap());
    s.force_recalc().unwrap();
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 2), 10.0, epsilon = 1e-2);
}

#[test]
fn inductor_current_held_by_shorting_source() {
    let mut s = sim(
        "\
1 0 V1 V=0 R=1m
1 0 L1 L=1m Iinit=1
",
        1e-6,
    );
    for _ in 0..100 {
        s.advance_step().unwrap();
    }
    assert_relative_eq!(s.inductor_current("L1").unwrap(), 1.0, epsilon = 1e-3);
    assert_relative_eq!(s.voltage_source_current("V1").unwrap().abs(), 1.0, epsilon = 1e-3);
}

#[test]
fn capacitor_charges_to_source() {
    let mut s = sim(
        "\
1 0 V1 V=5 R=1
1 0 C1 C=1u R=1m
",
        1e-8,
    );
    s.advance_step().unwrap();
    assert!(s.capacitor_voltage("C1").unwrap() > 0.0);
    for _ in 0..2000 {
        s.advance_step().unwrap();
    }
    assert_relative_eq!(s.capacitor_voltage("C1").unwrap(), 5.0, epsilon = 1e-3);
    assert_relative_eq!(v(&s, 1), 5.0, epsilon = 1e-3);
}

#[test]
fn capacitor_ramps_under_constant_current() {
    // 1 MV behind 1 MOhm is a 1 A source for any node voltage of interest
    let netlist = "\
1 0 V1 V=1M R=1M
1 0 C1 C=1m R=1m
";
    for dt in [1e-6, 5e-7, 2.5e-7] {
        let mut s = sim(netlist, dt);
        let steps = (1e-3 / dt).round() as usize;
        for _ in 0..steps {
            s.advance_step().unwrap();
        }
        // V = I * T / C
        assert_relative_eq!(s.capacitor_voltage("C1").unwrap(), 1.0, epsilon = 1e-4);
    }
}

#[test]
fn rc_charge_error_halves_with_time_step() {
    // tau = (1 + 1m) * 1m, charging towards 2 V
    let netlist = "\
1 0 V1 V=2 R=1
1 0 C1 C=1m R=1m
";
    let tau: f64 = 1.001e-3;
    let end = 1e-3;
    let exact = 2.0 * (1.0 - (-end / tau).exp());

    let errors: Vec<f64> = [1e-6, 5e-7, 2.5e-7]
        .into_iter()
        .map(|dt| {
            let mut s = sim(netlist, dt);
            let steps = (end / dt).round() as usize;
            for _ in 0..steps {
                s.advance_step().unwrap();
            }
            (s.capacitor_voltage("C1").unwrap() - exact).abs()
        })
        .collect();

    for pair in errors.windows(2) {
        let ratio = pair[0] / pair[1];
        assert!(ratio > 1.8 && ratio < 2.2, "errors {:?}", errors);
    }
    assert!(errors[0] < 1e-3, "errors {:?}", errors);
}

#[test]
fn diode_bridge_follows_sine() {
    let mut s = sim(
        "\
1 2 V1 V=0 R=1m
1 3 D1 R=10m
2 3 D2 R=10m
0 1 D3 R=10m
0 2 D4 R=10m
3 0 RL R=100
",
        1e-6,
    );
    for _ in 0..2000 {
        let source = 10.0 * (2.0 * std::f64::consts::PI * 1e3 * s.time()).sin();
        s.set_voltage_source("V1", source).unwrap();
        s.advance_step().unwrap();
        let out = v(&s, 3);
        assert!(out > -1e-6, "negative output {}", out);
        assert_relative_eq!(out, source.abs(), epsilon = 1e-2);
        assert!(!s.step_stats().fallback);
    }
}

#[test]
fn half_wave_rectifier_holds_peak() {
    let mut s = sim(
        "\
1 0 V1 V=0 R=1m
1 2 D1 R=10m
2 0 C1 C=100u R=1m
2 0 RL R=1k
",
        1e-6,
    );
    let mut peak: f64 = 0.0;
    for _ in 0..2000 {
        let t = s.time();
        s.set_voltage_source("V1", 10.0 * (2.0 * std::f64::consts::PI * 1e3 * t).sin())
            .unwrap();
        s.advance_step().unwrap();
        peak = peak.max(v(&s, 2));
        assert!(v(&s, 2) > -1e-3);
    }
    assert!(peak <= 10.0 + 1e-6);
    assert!(peak > 9.5);
    // Negative half cycle: capacitor holds the output
    assert!(v(&s, 2) > 9.0);
}

#[test]
fn diode_bridge_rectifies_both_polarities() {
    let netlist = "\
1 2 V1 V=10 R=1m
1 3 D1 R=10m
2 3 D2 R=10m
0 1 D3 R=10m
0 2 D4 R=10m
3 0 RL R=100
";
    let mut s = sim(netlist, 1e-6);
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 3), 10.0, epsilon = 1e-2);

    s.set_voltage_source("V1", -10.0).unwrap();
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 3), 10.0, epsilon = 1e-2);
    assert!(s.step_stats().iterations > 0);
}

#[test]
fn shockley_diode_forward_drop() {
    let mut s = sim(
        "\
1 0 V1 V=5 R=1k
1 0 d1
",
        1e-6,
    );
    s.advance_step().unwrap();
    let drop = v(&s, 1);
    assert!(drop > 0.5 && drop < 0.7, "forward drop {}", drop);
    assert!(s.step_stats().iterations > 1);

    // Reverse bias blocks
    s.set_voltage_source("V1", -5.0).unwrap();
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 1), -5.0, epsilon = 1e-3);
}

#[test]
fn buck_converter_regulates_to_duty_cycle() {
    let mut s = sim(
        "\
1 0 V1 V=12 R=1m
1 2 S1 R=10m
0 2 D1 R=10m
2 3 L1 L=100u
3 0 C1 C=100u R=10m
3 0 RL R=5
",
        1e-7,
    );
    let period = 100;
    let mut sum = 0.0;
    for step in 0..100_000 {
        s.set_switch("S1", step % period < period / 2).unwrap();
        s.advance_step().unwrap();
        if step >= 100_000 - period {
            sum += v(&s, 3);
        }
    }
    let average = sum / period as f64;
    assert!(average > 5.5 && average < 6.2, "average output {}", average);
}

#[test]
fn flux_transformer_steps_up() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 0 T1 R=1m N=1 primary=1 Lbase=1m Vmin=-100 Vmax=100
2 0 T1 R=1m N=2
2 0 RL R=100
",
        1e-6,
    );
    let turns = [1.0, 2.0];
    for _ in 0..100 {
        let magnetizing = s.transformer_magnetizing_current("T1").unwrap();
        s.advance_step().unwrap();

        let currents = s.transformer_winding_currents("T1").unwrap();
        let ampere_turns: f64 = currents.iter().zip(turns).map(|(i, n)| i * n).sum();
        assert_relative_eq!(ampere_turns, magnetizing, epsilon = 1e-4);
        assert_relative_eq!(v(&s, 2), 2.0 * v(&s, 1), max_relative = 1e-3);
    }

    assert_relative_eq!(s.transformer_magnetizing_current("T1").unwrap(), 1.0, epsilon = 1e-2);
    assert_relative_eq!(s.transformer_inductance("T1").unwrap(), 1e-3);
    assert!(s.step_stats().flux_search_iterations > 0);
}

#[test]
fn direct_transformer_steps_up() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 0 X1 R=1m N=1 primary=1 Lbase=1m
2 0 X1 R=1m N=2
2 0 RL R=100
",
        1e-6,
    );
    let turns = [1.0, 2.0];
    for _ in 0..100 {
        let magnetizing = s.transformer_magnetizing_current("X1").unwrap();
        s.advance_step().unwrap();

        let currents = s.transformer_winding_currents("X1").unwrap();
        let ampere_turns: f64 = currents.iter().zip(turns).map(|(i, n)| i * n).sum();
        assert_relative_eq!(ampere_turns, magnetizing, epsilon = 1e-6);
        assert_relative_eq!(v(&s, 2), 2.0 * v(&s, 1), max_relative = 1e-3);
    }

    assert_relative_eq!(s.transformer_magnetizing_current("X1").unwrap(), 1.0, epsilon = 1e-2);
    // No search involved
    assert_eq!(s.step_stats(), Default::default());
}

#[test]
fn flux_transformer_magnetizing_current_stops_at_zero() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 0 T1 R=1m N=1 primary=1 Lbase=1m Vmin=-100 Vmax=100
2 0 T1 R=1m N=2
2 0 RL R=100
",
        1e-6,
    );
    s.advance_step().unwrap();
    assert_relative_eq!(s.transformer_magnetizing_current("T1").unwrap(), 1e-2, max_relative = 1e-2);

    // One step of reversed drive would overshoot past zero
    s.set_voltage_source("V1", -30.0).unwrap();
    s.advance_step().unwrap();
    assert_eq!(s.transformer_magnetizing_current("T1").unwrap(), 0.0);

    s.advance_step().unwrap();
    assert!(s.transformer_magnetizing_current("T1").unwrap() < 0.0);
}

#[test]
fn direct_transformer_magnetizing_current_stops_at_zero() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 0 X1 R=1m N=1 primary=1 Lbase=1m
2 0 X1 R=1m N=2
2 0 RL R=100
",
        1e-6,
    );
    s.advance_step().unwrap();
    assert_relative_eq!(s.transformer_magnetizing_current("X1").unwrap(), 1e-2, max_relative = 1e-2);

    s.set_voltage_source("V1", -30.0).unwrap();
    s.advance_step().unwrap();
    assert_eq!(s.transformer_magnetizing_current("X1").unwrap(), 0.0);

    s.advance_step().unwrap();
    assert!(s.transformer_magnetizing_current("X1").unwrap() < 0.0);
}

#[test]
fn transformer_out_of_bounds() {
    let mut s = sim(
        "\
1 0 V1 V=10 R=1m
1 0 T1 R=1m N=1 primary=1 Lbase=1m Vmin=-1 Vmax=1
2 0 T1 R=1m N=2
2 0 RL R=100
",
        1e-6,
    );
    let err = s.advance_step().unwrap_err();
    assert!(matches!(err, SimError::SearchBounds { ref transformer, .. } if transformer == "T1"));
    assert_eq!(err.kind(), ErrorKind::SearchBounds);
}

#[test]
fn node_gap_is_rejected() {
    let err = Simulator::from_netlist("1 0 R1 R=1\n3 0 R2 R=1\n", 1e-6).unwrap_err();
    assert!(matches!(err, SimError::NodeNotSeen { node: 2 }));
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn incremental_load_matches_single_netlist() {
    let mut builder = TopologyBuilder::new();
    builder
        .load("1 0 V1 V=10 R=1m\n")
        .unwrap()
        .load("1 2 R1 R=10\n2 0 R2 R=30\n")
        .unwrap();
    let circuit = builder.finalize().unwrap();
    let config = SimulatorConfig::new().with_open_conductance(1e-12);
    let mut s = Simulator::with_config(circuit, 1e-6, config).unwrap();
    s.advance_step().unwrap();
    assert_relative_eq!(v(&s, 2), 7.5, epsilon = 1e-2);
}
