//! Console reviewer
//!
//! Shows each suggestion and reads one answer line:
//! empty or `y` accepts, a number or category name replaces, `-` or `n`
//! leaves the item unresolved, `s` skips it for a later run. End of input
//! skips everything that is left.

use std::io::{BufRead, Write};

use billwise_core::{
    CategoryLabel, CurrencyConfig, Proposal, ProposalSource, RawLineItem, ReviewDecision, Reviewer,
};
use tracing::warn;

pub struct ConsoleReviewer<R, W> {
    input: R,
    output: W,
    labels: Vec<CategoryLabel>,
    currency: CurrencyConfig,
    asked: usize,
    exhausted: bool,
}

impl<R: BufRead, W: Write> ConsoleReviewer<R, W> {
    pub fn new(input: R, output: W, labels: &[CategoryLabel], currency: &CurrencyConfig) -> Self {
        Self {
            input,
            output,
            labels: labels.to_vec(),
            currency: currency.clone(),
            asked: 0,
            exhausted: false,
        }
    }

    /// Print the numbered category list and the answer keys
    pub fn print_categories(&mut self) -> std::io::Result<()> {
        writeln!(self.output, "Categories:")?;
        for (i, label) in self.labels.iter().enumerate() {
            writeln!(self.output, "  {:>2}. {}", i + 1, label.display_name())?;
        }
        writeln!(
            self.output,
            "Enter accepts | number or name changes | '-' unresolved | 's' skip"
        )?;
        Ok(())
    }

    fn ask(&mut self, item: &RawLineItem, proposal: &Proposal) -> std::io::Result<Option<String>> {
        self.asked += 1;
        let out = &mut self.output;

        writeln!(out)?;
        writeln!(
            out,
            "[{}] {}  {}  {}",
            self.asked,
            item.date,
            item.description,
            self.currency.format(item.amount)
        )?;
        if let Some(ref note) = item.note {
            writeln!(out, "    Note: {}", note)?;
        }
        let origin = match proposal.source {
            ProposalSource::Memory => " (remembered)",
            ProposalSource::Service => "",
        };
        writeln!(
            out,
            "    Suggested: {}{}",
            proposal.category.display_name(),
            origin
        )?;
        if proposal.fallback {
            writeln!(out, "    Service answered '{}', not in the list", proposal.raw)?;
        }
        if let Some(ref rationale) = proposal.rationale {
            writeln!(out, "    Why: {}", rationale)?;
        }
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Reviewer for ConsoleReviewer<R, W> {
    fn review(&mut self, item: &RawLineItem, proposal: &Proposal) -> ReviewDecision {
        if self.exhausted {
            return ReviewDecision::Defer;
        }
        match self.ask(item, proposal) {
            Ok(Some(answer)) => parse_answer(&answer, &self.labels),
            Ok(None) => {
                warn!("Input closed; remaining items stay unreviewed");
                self.exhausted = true;
                ReviewDecision::Defer
            }
            Err(e) => {
                warn!(error = %e, "Console unavailable; remaining items stay unreviewed");
                self.exhausted = true;
                ReviewDecision::Defer
            }
        }
    }
}

/// Map one console answer to a review decision
pub fn parse_answer(answer: &str, labels: &[CategoryLabel]) -> ReviewDecision {
    match answer.trim() {
        "" | "y" | "Y" => ReviewDecision::Accept,
        "-" | "n" | "N" => ReviewDecision::Reject,
        "s" | "S" => ReviewDecision::Defer,
        text => match text.parse::<usize>() {
            Ok(n) if (1..=labels.len()).contains(&n) => {
                ReviewDecision::Replace(labels[n - 1].key.clone())
            }
            _ => ReviewDecision::Replace(text.to_string()),
        },
    }
}
