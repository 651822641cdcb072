//! Interactive decision prompt.
//!
//! Presents each migration problem on stderr and reads the decision from
//! stdin. An uppercase choice remembers the decision for all later
//! problems of the same type; EOF counts as a dismissal (abort).

use std::collections::BTreeMap;
use std::io::BufRead as _;

use itsq::model::{MigrationProblem, ProblemType, Resolution};
use itsq::resolve::{Decision, DecisionHandler};

/// Decision-maker that prompts on the terminal.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl DecisionHandler for ConsolePrompt {
    fn decide(
        &mut self,
        problem: &MigrationProblem,
        _remembered: &BTreeMap<ProblemType, Resolution>,
    ) -> Option<Decision> {
        let allow_copy = problem.problem_type.allows(Resolution::CopyAnyway);
        eprintln!();
        eprintln!("problem: {problem}");
        if let Some(path) = &problem.source_file {
            eprintln!("  file: {}", path.display());
        }

        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            if allow_copy {
                eprint!("  [s]kip, [c]opy anyway, [a]bort (uppercase = remember)? ");
            } else {
                eprint!("  [s]kip, [a]bort (uppercase = remember)? ");
            }
            let line = lines.next()?.ok()?;
            match choice_from_input(&line, allow_copy) {
                Choice::Decided(decision) => return Some(decision),
                Choice::Invalid => eprintln!("  unrecognized choice '{}'", line.trim()),
            }
        }
    }
}

/// Result of interpreting one input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Choice {
    Decided(Decision),
    Invalid,
}

fn choice_from_input(line: &str, allow_copy: bool) -> Choice {
    let trimmed = line.trim();
    let remember = trimmed.chars().next().is_some_and(char::is_uppercase);
    let resolution = match trimmed.to_ascii_lowercase().as_str() {
        "s" | "skip" => Resolution::Skip,
        "c" | "copy" if allow_copy => Resolution::CopyAnyway,
        "a" | "abort" => Resolution::Abort,
        _ => return Choice::Invalid,
    };
    Choice::Decided(Decision {
        resolution,
        remember,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_choices_do_not_remember() {
        assert_eq!(
            choice_from_input("s", true),
            Choice::Decided(Decision {
                resolution: Resolution::Skip,
                remember: false,
            })
        );
        assert_eq!(
            choice_from_input("a", false),
            Choice::Decided(Decision {
                resolution: Resolution::Abort,
                remember: false,
            })
        );
    }

    #[test]
    fn uppercase_choices_remember() {
        assert_eq!(
            choice_from_input("S", true),
            Choice::Decided(Decision {
                resolution: Resolution::Skip,
                remember: true,
            })
        );
    }

    #[test]
    fn copy_only_offered_when_allowed() {
        assert!(matches!(choice_from_input("c", true), Choice::Decided(_)));
        assert_eq!(choice_from_input("c", false), Choice::Invalid);
    }

    #[test]
    fn words_are_accepted() {
        assert!(matches!(choice_from_input("  skip ", true), Choice::Decided(_)));
        assert!(matches!(choice_from_input("abort", true), Choice::Decided(_)));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(choice_from_input("x", true), Choice::Invalid);
        assert_eq!(choice_from_input("", true), Choice::Invalid);
    }
}
