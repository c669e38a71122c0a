//! Human readable rendering of solve outcomes.

use crate::{Adjustment, Flow, Leg, Outcome};
use std::fmt;

/// Group the integer part of `value` in thousands: `5191000.4` → `5,191,000`
pub fn thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// `£5,191,000`, with the sign in front of the currency symbol
pub fn currency(value: f64) -> String {
    let amount = thousands(value);
    match amount.strip_prefix('-') {
        Some(magnitude) => format!("-£{magnitude}"),
        None => format!("£{amount}"),
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} t @ £{}/t",
            self.route,
            thousands(self.tons),
            self.unit_cost
        )?;
        if self.prohibitive {
            write!(f, " (prohibitive)")?;
        }
        Ok(())
    }
}

/// One solve, rendered under the heading of the variant that produced it.
pub struct Report<'a> {
    adjustment: &'a Adjustment,
    outcome: &'a Outcome,
}

impl<'a> Report<'a> {
    pub fn new(adjustment: &'a Adjustment, outcome: &'a Outcome) -> Self {
        Self {
            adjustment,
            outcome,
        }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caption = self.adjustment.objective_caption();
        writeln!(
            f,
            "Status ({}): {}",
            self.adjustment.label(),
            self.outcome.status
        )?;

        let Some(plan) = &self.outcome.plan else {
            writeln!(f, "{caption}: n/a")?;
            return writeln!(f, "Warehouses kept open: n/a");
        };

        writeln!(f, "{caption}: {}", currency(plan.objective))?;
        writeln!(
            f,
            "Warehouses kept open: {}",
            plan.open_warehouses().join(", ")
        )?;

        for leg in Leg::ALL {
            writeln!(f, "\n{}", leg.title())?;
            for flow in plan.shipments(leg) {
                writeln!(f, "  {flow}")?;
            }
        }
        Ok(())
    }
}
