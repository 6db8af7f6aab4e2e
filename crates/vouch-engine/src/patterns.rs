//! Risk classification and dry-run rewriting.
//!
//! An ordered list of regex rules maps a raw command onto a risk tier; the
//! first match wins and unmatched commands are safe. Wrapper tokens
//! (`sudo`, `env`, `time`, `nice`) are stripped before matching so a
//! wrapped destructive command classifies like the bare one.

use regex::Regex;

use vouch_core::{CommandSpec, RiskTier};

/// The result of classifying a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Risk tier the command falls into.
    pub tier: RiskTier,
    /// Id of the rule that matched, when one did.
    pub pattern_id: Option<&'static str>,
}

/// Classifies commands and produces non-destructive preview rewrites.
///
/// A default engine is supplied ([`DefaultPatternEngine`]); collaborators
/// may swap in their own rule sets.
pub trait PatternEngine: Send + Sync {
    /// Classify a command spec into a risk tier.
    fn classify(&self, spec: &CommandSpec) -> Classification;

    /// A non-destructive equivalent of `raw`, for supported verbs.
    ///
    /// Returns `None` when no rewrite is known. Idempotent for rewrites
    /// that are themselves supported inputs (`kubectl delete --dry-run`).
    fn dry_run(&self, raw: &str) -> Option<String>;
}

struct Rule {
    id: &'static str,
    regex: Regex,
    tier: RiskTier,
}

/// The built-in ordered rule set.
pub struct DefaultPatternEngine {
    rules: Vec<Rule>,
}

impl DefaultPatternEngine {
    /// Build the engine, compiling every rule once.
    #[must_use]
    pub fn new() -> Self {
        let table: &[(&'static str, &'static str, RiskTier)] = &[
            // Critical: irreversible, wide blast radius.
            (
                "rm-rf-root",
                r"^rm\s+(?:-[A-Za-z]+\s+)*(?:/|/\*|~|\$HOME)(?:\s|$)",
                RiskTier::Critical,
            ),
            ("terraform-destroy", r"^terraform\s+destroy\b", RiskTier::Critical),
            (
                "kubectl-delete-namespace",
                r"^kubectl\s+delete\s+(?:ns|namespace)\b",
                RiskTier::Critical,
            ),
            ("dd-device", r"^dd\b.*\bof=/dev/", RiskTier::Critical),
            ("mkfs", r"^mkfs(?:\.|\s|$)", RiskTier::Critical),
            (
                "host-power",
                r"^(?:shutdown|reboot|halt|poweroff)\b",
                RiskTier::Critical,
            ),
            (
                "sql-drop",
                r"(?i)\bdrop\s+(?:database|table)\b",
                RiskTier::Critical,
            ),
            // Dangerous: destructive but scoped; rollback often possible.
            (
                "rm-recursive",
                r"^rm\s+(?:.*\s)?-[A-Za-z]*[rR][A-Za-z]*(?:\s|$)",
                RiskTier::Dangerous,
            ),
            (
                "rm-force",
                r"^rm\s+(?:.*\s)?-[A-Za-z]*f[A-Za-z]*(?:\s|$)",
                RiskTier::Dangerous,
            ),
            (
                "git-push-force",
                r"^git\s+push\b.*\s(?:--force(?:-with-lease)?|-f)(?:\s|$)",
                RiskTier::Dangerous,
            ),
            ("git-reset-hard", r"^git\s+reset\s+--hard\b", RiskTier::Dangerous),
            ("git-clean", r"^git\s+clean\b", RiskTier::Dangerous),
            (
                "git-checkout-all",
                r"^git\s+checkout\s+(?:--\s+)?\.(?:\s|$)",
                RiskTier::Dangerous,
            ),
            ("git-branch-delete", r"^git\s+branch\s+(?:.*\s)?-D\b", RiskTier::Dangerous),
            ("kubectl-delete", r"^kubectl\s+delete\b", RiskTier::Dangerous),
            (
                "helm-uninstall",
                r"^helm\s+(?:uninstall|delete)\b",
                RiskTier::Dangerous,
            ),
            (
                "docker-prune",
                r"^docker\s+(?:system|volume|image)\s+prune\b",
                RiskTier::Dangerous,
            ),
            (
                "chmod-world-writable",
                r"^chmod\s+(?:-[A-Za-z]+\s+)*0?777\b",
                RiskTier::Dangerous,
            ),
            ("chown-recursive", r"^chown\s+(?:.*\s)?-[A-Za-z]*R\b", RiskTier::Dangerous),
            (
                "curl-pipe-shell",
                r"^(?:curl|wget)\b.*\|\s*(?:ba|z)?sh\b",
                RiskTier::Dangerous,
            ),
            (
                "systemctl-stop",
                r"^systemctl\s+(?:stop|disable|mask)\b",
                RiskTier::Dangerous,
            ),
            // Caution: worth a second pair of eyes.
            (
                "pkg-global-install",
                r"^(?:npm|pnpm)\s+(?:install|i|add)\s+(?:.*\s)?(?:-g|--global)(?:\s|$)",
                RiskTier::Caution,
            ),
            ("yarn-global-add", r"^yarn\s+global\s+add\b", RiskTier::Caution),
            ("pip-install", r"^pip3?\s+install\b", RiskTier::Caution),
            ("rm", r"^rm\s+", RiskTier::Caution),
            ("mv", r"^mv\s+", RiskTier::Caution),
            (
                "write-redirect",
                r"(?:^|[^>])>(?:[^>]|$)",
                RiskTier::Caution,
            ),
        ];

        let rules = table
            .iter()
            .map(|&(id, pattern, tier)| Rule {
                id,
                regex: Regex::new(pattern).expect("built-in rule regex"),
                tier,
            })
            .collect();
        Self { rules }
    }
}

impl Default for DefaultPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternEngine for DefaultPatternEngine {
    fn classify(&self, spec: &CommandSpec) -> Classification {
        let stripped = strip_wrappers(&spec.raw);
        for rule in &self.rules {
            if rule.regex.is_match(&stripped) {
                return Classification {
                    tier: rule.tier,
                    pattern_id: Some(rule.id),
                };
            }
        }
        Classification {
            tier: RiskTier::Safe,
            pattern_id: None,
        }
    }

    fn dry_run(&self, raw: &str) -> Option<String> {
        dry_run_rewrite(raw)
    }
}

/// Strip leading wrapper tokens (`sudo`, `env`, `time`, `nice`) and their
/// own flags so classification sees the real command.
#[must_use]
pub fn strip_wrappers(raw: &str) -> String {
    let mut tokens: Vec<&str> = raw.split_whitespace().collect();
    loop {
        match tokens.first().copied() {
            Some("sudo") => {
                tokens.remove(0);
                while let Some(tok) = tokens.first().copied() {
                    if tok == "-u" || tok == "-g" {
                        // flag with an argument
                        tokens.remove(0);
                        if !tokens.is_empty() {
                            tokens.remove(0);
                        }
                    } else if tok.starts_with('-') {
                        tokens.remove(0);
                    } else {
                        break;
                    }
                }
            }
            Some("env") => {
                tokens.remove(0);
                while let Some(tok) = tokens.first().copied() {
                    if tok.contains('=') || tok.starts_with('-') {
                        tokens.remove(0);
                    } else {
                        break;
                    }
                }
            }
            Some("time") => {
                tokens.remove(0);
            }
            Some("nice") => {
                tokens.remove(0);
                while let Some(tok) = tokens.first().copied() {
                    if tok == "-n" {
                        tokens.remove(0);
                        if !tokens.is_empty() {
                            tokens.remove(0);
                        }
                    } else if tok.starts_with('-') {
                        tokens.remove(0);
                    } else {
                        break;
                    }
                }
            }
            _ => break,
        }
    }
    tokens.join(" ")
}

/// The dry-run rewrite table.
fn dry_run_rewrite(raw: &str) -> Option<String> {
    let stripped = strip_wrappers(raw);
    let tokens: Vec<&str> = stripped.split_whitespace().collect();

    match (tokens.first().copied(), tokens.get(1).copied()) {
        (Some("kubectl"), Some("delete")) => {
            if tokens.iter().any(|t| t.starts_with("--dry-run")) {
                Some(stripped)
            } else {
                Some(format!("{stripped} --dry-run=client -o yaml"))
            }
        }
        (Some("rm"), _) => {
            let paths: Vec<&str> = tokens[1..]
                .iter()
                .copied()
                .filter(|t| !t.starts_with('-'))
                .collect();
            if paths.is_empty() {
                None
            } else {
                Some(format!("ls -la {}", paths.join(" ")))
            }
        }
        (Some("git"), Some("reset")) if tokens.get(2) == Some(&"--hard") => {
            let reference = tokens
                .get(3)
                .copied()
                .filter(|t| !t.starts_with('-'))
                .unwrap_or("HEAD");
            Some(format!("git diff {reference}..HEAD"))
        }
        (Some("terraform"), Some("destroy")) => {
            let rest = tokens[2..].join(" ");
            if rest.is_empty() {
                Some("terraform plan -destroy".to_string())
            } else {
                Some(format!("terraform plan -destroy {rest}"))
            }
        }
        (Some("helm"), Some("uninstall" | "delete")) => {
            let release = tokens[2..].iter().copied().find(|t| !t.starts_with('-'))?;
            Some(format!("helm get manifest {release}"))
        }
        _ => None,
    }
}
