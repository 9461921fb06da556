//! Flux-balance search for the flux-linked transformer.
//!
//! Each step the windings of the flux-linked transformer are driven from a
//! trial primary voltage. The trial is right when the flux implied by the
//! solved winding currents equals the flux stored in the core. The search
//! brackets the answer between the primary's `Vmin` and `Vmax` and bisects.
//!
//! Every new trial voltage needs a fresh solve of the circuit, so the search
//! is a resumable state machine: [`FluxSearch::resume`] runs until it has
//! applied a new trial voltage and returns [`SearchStep::Retry`], and is
//! called again once the caller has re-solved.

use std::cmp::Ordering;

use crate::circuit::ElementId;

/// Flux magnitude below which a target and a bound both count as zero.
const DEGENERATE_FLUX: f64 = 1e-12;

/// State of the flux-balance search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// No search running
    Idle,
    /// Apply the lower bound
    Lobo,
    /// Evaluate the lower bound
    LoboPost,
    /// Apply the upper bound
    Hibo,
    /// Evaluate the upper bound
    HiboPost,
    /// Apply the midpoint
    Iter,
    /// Evaluate the midpoint and narrow the bracket
    IterPost,
    /// Converged for this step
    Fini,
}

/// What the caller must do after [`FluxSearch::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    /// A trial voltage was applied; re-solve and resume
    Retry,
    /// Nothing left to do this step
    Done,
}

/// The circuit as seen by the search.
pub trait FluxProbe {
    /// Search bracket `(Vmin, Vmax)` of the primary.
    fn bounds(&self) -> (f64, f64);

    /// Drive every winding from the primary voltage `volts`.
    fn apply_voltage(&mut self, volts: f64);

    /// Flux implied by the last solve.
    fn trial_flux(&self) -> f64;

    /// Flux stored in the core.
    fn target_flux(&self) -> f64;
}

/// The flux target lies outside the search bracket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsViolation {
    pub target: f64,
    pub lobo_flux: f64,
    pub hibo_flux: f64,
}

/// Resumable bisection over the primary voltage.
#[derive(Debug, Clone)]
pub struct FluxSearch {
    state: SearchState,
    primary: Option<ElementId>,
    tolerance: f64,
    lobo_v: f64,
    hibo_v: f64,
    trial_v: f64,
    lobo_flux: f64,
    hibo_flux: f64,
    iterations: usize,
}

impl FluxSearch {
    /// Create an idle search that stops once the bracket is narrower than
    /// `tolerance` volts.
    pub fn new(tolerance: f64) -> Self {
        Self {
            state: SearchState::Idle,
            primary: None,
            tolerance,
            lobo_v: 0.0,
            hibo_v: 0.0,
            trial_v: 0.0,
            lobo_flux: 0.0,
            hibo_flux: 0.0,
            iterations: 0,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Primary being searched, if a search has started this step.
    pub fn primary(&self) -> Option<ElementId> {
        self.primary
    }

    /// Last voltage applied to the windings.
    pub fn trial_voltage(&self) -> f64 {
        self.trial_v
    }

    /// Number of bisection halvings this step.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Start a search for `primary`.
    pub fn start(&mut self, primary: ElementId) {
        self.primary = Some(primary);
        self.state = SearchState::Lobo;
        self.iterations = 0;
    }

    /// Return to idle; the next step starts a fresh search.
    pub fn reset(&mut self) {
        self.primary = None;
        self.state = SearchState::Idle;
        self.iterations = 0;
    }

    /// Run the search until a new trial voltage is applied or it is done.
    pub fn resume<P: FluxProbe>(
        &mut self,
        probe: &mut P,
    ) -> Result<SearchStep, BoundsViolation> {
        loop {
            match self.state {
                SearchState::Idle | SearchState::Fini => return Ok(SearchStep::Done),

                SearchState::Lobo => {
                    let (v_min, _) = probe.bounds();
                    self.lobo_v = v_min;
                    self.apply(probe, v_min);
                    self.state = SearchState::LoboPost;
                    return Ok(SearchStep::Retry);
                }

                SearchState::LoboPost => {
                    let target = probe.target_flux();
                    self.lobo_flux = probe.trial_flux();
                    if compare(self.lobo_flux, target) == Ordering::Equal {
                        self.state = SearchState::Fini;
                        return Ok(SearchStep::Retry);
                    }
                    self.state = SearchState::Hibo;
                }

                SearchState::Hibo => {
                    let (_, v_max) = probe.bounds();
                    self.hibo_v = v_max;
                    self.apply(probe, v_max);
                    self.state = SearchState::HiboPost;
                    return Ok(SearchStep::Retry);
                }

                SearchState::HiboPost => {
                    let target = probe.target_flux();
                    self.hibo_flux = probe.trial_flux();
                    let low = compare(self.lobo_flux, target);
                    let high = compare(self.hibo_flux, target);

                    if high == Ordering::Equal {
                        self.state = SearchState::Fini;
                        return Ok(SearchStep::Retry);
                    }
                    if low == high {
                        return self.degenerate_bound(probe, target);
                    }
                    self.state = SearchState::Iter;
                }

                SearchState::Iter => {
                    let mid = (self.lobo_v + self.hibo_v) / 2.0;
                    self.apply(probe, mid);
                    self.iterations += 1;
                    self.state = SearchState::IterPost;
                    return Ok(SearchStep::Retry);
                }

                SearchState::IterPost => {
                    let target = probe.target_flux();
                    let flux = probe.trial_flux();

                    if (self.hibo_v - self.lobo_v).abs() < self.tolerance {
                        self.state = SearchState::Fini;
                        continue;
                    }
                    let trial = compare(flux, target);
                    if trial == Ordering::Equal {
                        self.state = SearchState::Fini;
                        continue;
                    }

                    let low = compare(self.lobo_flux, target);
                    let high = compare(self.hibo_flux, target);
                    if low == high || low == Ordering::Equal || high == Ordering::Equal {
                        return Err(self.violation(target));
                    }
                    if trial == low {
                        self.lobo_v = self.trial_v;
                        self.lobo_flux = flux;
                    } else {
                        self.hibo_v = self.trial_v;
                        self.hibo_flux = flux;
                    }
                    self.state = SearchState::Iter;
                }
            }
        }
    }

    /// Both bounds on one side of the target. Accept the bound nearer zero
    /// when target and that bound are both zero; otherwise the bracket is wrong.
    fn degenerate_bound<P: FluxProbe>(
        &mut self,
        probe: &mut P,
        target: f64,
    ) -> Result<SearchStep, BoundsViolation> {
        let near_zero = target.abs() < DEGENERATE_FLUX
            && (self.lobo_flux.abs() < DEGENERATE_FLUX || self.hibo_flux.abs() < DEGENERATE_FLUX);
        if !near_zero {
            return Err(self.violation(target));
        }

        let volts = if self.lobo_flux.abs() < self.hibo_flux.abs() {
            self.lobo_v
        } else {
            self.hibo_v
        };
        self.apply(probe, volts);
        self.state = SearchState::Fini;
        Ok(SearchStep::Retry)
    }

    fn apply<P: FluxProbe>(&mut self, probe: &mut P, volts: f64) {
        self.trial_v = volts;
        probe.apply_voltage(volts);
    }

    fn violation(&self, target: f64) -> BoundsViolation {
        BoundsViolation {
            target,
            lobo_flux: self.lobo_flux,
            hibo_flux: self.hibo_flux,
        }
    }
}

/// Exact three-way comparison; unordered values compare equal.
fn compare(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
