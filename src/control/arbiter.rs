/// Per-cycle action selection.
///
/// The whole policy is `PRIORITY_ORDER`: rules are consulted in that order
/// and the first one that matches decides the cycle.
use crate::perception::types::{best_of, Category, Detection, DismissVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Burst-click the primary action. Ignores the single-flight lock.
    Primary,
    /// Hand the secondary target to a background handler.
    Secondary,
    /// Re-verify, then click a dismiss button.
    Dismiss,
}

pub const PRIORITY_ORDER: [Rule; 3] = [Rule::Primary, Rule::Secondary, Rule::Dismiss];

/// Back buttons win over close buttons when both are visible.
pub const DISMISS_ORDER: [DismissVariant; 2] = [DismissVariant::Back, DismissVariant::Close];

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Burst(Detection),
    Secondary(Detection),
    Dismiss(DismissVariant, Detection),
    /// A secondary handler is in flight; nothing below it may run.
    Held,
    Idle,
}

pub fn arbitrate(detections: &[Detection], secondary_in_flight: bool) -> Decision {
    for rule in PRIORITY_ORDER {
        match rule {
            Rule::Primary => {
                if let Some(d) = best_of(detections, Category::PrimaryAction) {
                    return Decision::Burst(d.clone());
                }
            }
            Rule::Secondary => {
                if secondary_in_flight {
                    return Decision::Held;
                }
                if let Some(d) = best_of(detections, Category::SecondaryTarget) {
                    return Decision::Secondary(d.clone());
                }
            }
            Rule::Dismiss => {
                for variant in DISMISS_ORDER {
                    if let Some(d) = best_of(detections, Category::Dismiss(variant)) {
                        return Decision::Dismiss(variant, d.clone());
                    }
                }
            }
        }
    }
    Decision::Idle
}
