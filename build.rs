use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding crate sources. Anything else in the package root
// (vendored material, target/) is not linted.
const SOURCE_ROOTS: &[&str] = &["src", "tests"];

struct Check {
    label: &'static str,
    pattern: &'static str,
    // Ignore matches inside line comments or string literals.
    code_only: bool,
    advice: &'static str,
}

const CHECKS: &[Check] = &[
    Check {
        label: "#[allow(dead_code)]",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        code_only: false,
        advice: "Remove the unused code or use it; do not silence the lint.",
    },
    Check {
        label: "#[ignore]",
        pattern: r"#\s*\[\s*ignore\s*\]",
        code_only: false,
        advice: "Fix the test or delete it; ignored tests are not allowed.",
    },
    Check {
        label: "debug_assert",
        pattern: r"\bdebug_assert(_eq|_ne)?!",
        code_only: true,
        advice: "Checks must hold in release builds too; return an error instead.",
    },
];

// Collects the matching lines of one file for one check.
struct ViolationCollector {
    violations: Vec<String>,
    file_path: PathBuf,
    // Set for code-only checks: the literal text the pattern matches.
    code_needle: Option<&'static str>,
}

impl ViolationCollector {
    fn new(file_path: &Path, check: &Check) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
            code_needle: check.code_only.then_some(check.label),
        }
    }

    fn check_and_get_error_message(&self, check: &Check) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        Some(format!(
            "\n❌ {} found {} time(s) in {}:\n{}\n{}",
            check.label,
            self.violations.len(),
            self.file_path.display(),
            self.violations.join("\n"),
            check.advice
        ))
    }
}

// True when `needle` appears on the line only inside comments or strings.
fn only_in_comment_or_string(line_text: &str, needle: &str) -> bool {
    let trimmed = line_text.trim_start();
    if trimmed.starts_with("//") {
        return true;
    }
    let code: String = line_text
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join(" ");
    let code = code.split("//").next().unwrap_or("");
    !code.contains(needle)
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if let Some(needle) = self.code_needle {
            if only_in_comment_or_string(line_text, needle) {
                return Ok(true);
            }
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|entry| entry.into_path())
        .collect()
}

fn scan(check: &Check, sources: &[PathBuf]) -> Vec<String> {
    let matcher = match RegexMatcher::new_line_matcher(check.pattern) {
        Ok(matcher) => matcher,
        Err(e) => return vec![format!("Error creating {} matcher: {e}", check.label)],
    };
    let mut searcher = Searcher::new();
    let mut violations = Vec::new();
    for path in sources {
        let mut collector = ViolationCollector::new(path, check);
        if searcher.search_path(&matcher, path, &mut collector).is_err() {
            continue;
        }
        if let Some(message) = collector.check_and_get_error_message(check) {
            violations.push(message);
        }
    }
    violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS.iter().filter(|root| Path::new(root).exists()) {
        println!("cargo:rerun-if-changed={root}");
    }

    if std::env::var("ADAPTIVE_BFGS_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok()
    {
        return;
    }

    let sources = rust_sources();
    let all_violations: Vec<String> = CHECKS
        .iter()
        .flat_map(|check| scan(check, &sources))
        .collect();

    if !all_violations.is_empty() {
        eprintln!("\n❌ VALIDATION ERRORS");
        eprintln!("====================");
        let violation_count = all_violations.len();
        for violation in all_violations {
            eprintln!("{violation}");
            eprintln!("--------------------");
        }
        eprintln!(
            "\n⚠️ Found {violation_count} total code quality violations. Fix all issues before committing."
        );
        std::process::exit(1);
    }
}
