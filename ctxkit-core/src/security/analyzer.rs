//! Denylist scan run before any script is parsed.
//!
//! The interpreter has no route to these constructs in the first place; the
//! scan rejects obviously hostile submissions early and gives the caller a
//! readable reason.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::warn;

/// Submissions longer than this (in chars) get a non-blocking warning.
pub const LARGE_SUBMISSION_CHARS: usize = 50_000;

/// Result of scanning one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityVerdict {
    pub safe: bool,
    pub blocked_patterns: Vec<String>,
    pub warnings: Vec<String>,
}

struct BlockRule {
    label: &'static str,
    reason: &'static str,
    regex: Regex,
}

/// `(label, reason, pattern)` for every blocked construct.
const BLOCK_RULES: &[(&str, &str, &str)] = &[
    ("eval()", "dynamic code evaluation", r"\beval\s*\("),
    ("new Function()", "dynamic code evaluation", r"\bnew\s+Function\s*\("),
    ("require()", "module loading", r"\brequire\s*\("),
    ("import()", "dynamic module loading", r"\bimport\s*\("),
    (
        "import statement",
        "module loading",
        r#"(?m)^\s*import\s+[\w*{'"]"#,
    ),
    ("process", "host process access", r"\bprocess\b"),
    ("global", "global object access", r"\bglobal\b"),
    ("globalThis", "global object access", r"\bglobalThis\b"),
    ("child_process", "subprocess spawning", r"\bchild_process\b"),
    ("setTimeout", "timers", r"\bsetTimeout\b"),
    ("setInterval", "timers", r"\bsetInterval\b"),
    ("setImmediate", "timers", r"\bsetImmediate\b"),
    ("__proto__", "prototype tampering", r"__proto__"),
    (
        "constructor",
        "constructor chain access",
        r#"\.\s*constructor\b|\[\s*['"`]constructor['"`]\s*\]"#,
    ),
    ("Reflect", "reflection", r"\bReflect\s*\."),
    (
        "Object.setPrototypeOf",
        "prototype tampering",
        r"\bObject\s*\.\s*setPrototypeOf\b",
    ),
    (
        "Object.defineProperty",
        "property redefinition",
        r"\bObject\s*\.\s*definePropert(?:y|ies)\b",
    ),
    ("Proxy", "reflection", r"\bProxy\b"),
    ("fetch()", "network access", r"\bfetch\s*\("),
    ("XMLHttpRequest", "network access", r"\bXMLHttpRequest\b"),
    ("WebSocket", "network access", r"\bWebSocket\b"),
];

static BLOCKLIST: LazyLock<Vec<BlockRule>> = LazyLock::new(|| {
    BLOCK_RULES
        .iter()
        .map(|(label, reason, pattern)| BlockRule {
            label,
            reason,
            regex: compile_regex(pattern),
        })
        .collect()
});

static UNBOUNDED_LOOP: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"\bwhile\s*\(\s*(?:true|1)\s*\)|\bfor\s*\(\s*;\s*;\s*\)")
});

static BREAK_KEYWORD: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"\bbreak\b"));

/// Scan `code` and report every denylisted construct plus non-blocking warnings.
///
/// Deterministic and free of I/O: the same input always yields the same verdict.
pub fn analyze_code(code: &str) -> SecurityVerdict {
    let blocked_patterns: Vec<String> = BLOCKLIST
        .iter()
        .filter(|rule| rule.regex.is_match(code))
        .map(|rule| format!("{}: {} is not allowed", rule.label, rule.reason))
        .collect();

    let mut warnings = Vec::new();
    if UNBOUNDED_LOOP.is_match(code) && !BREAK_KEYWORD.is_match(code) {
        warnings.push(
            "Possible infinite loop: unbounded loop without a visible break; execution will stop at the timeout"
                .to_string(),
        );
    }
    let length = code.chars().count();
    if length > LARGE_SUBMISSION_CHARS {
        warnings.push(format!(
            "Large submission: {length} characters exceeds the recommended {LARGE_SUBMISSION_CHARS}"
        ));
    }

    let safe = blocked_patterns.is_empty();
    if !safe {
        warn!(blocked = ?blocked_patterns, "Rejected script during static analysis");
    }

    SecurityVerdict {
        safe,
        blocked_patterns,
        warnings,
    }
}

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is acceptable thanks to the `load_rules` test
        Err(err) => panic!("invalid denylist pattern `{pattern}`: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blocked_labels(code: &str) -> Vec<String> {
        analyze_code(code)
            .blocked_patterns
            .into_iter()
            .map(|entry| entry.split(':').next().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn load_rules() {
        assert_eq!(BLOCKLIST.len(), BLOCK_RULES.len());
        let _ = UNBOUNDED_LOOP.is_match("");
        let _ = BREAK_KEYWORD.is_match("");
    }

    #[test]
    fn blocks_dynamic_evaluation() {
        assert_eq!(blocked_labels("return eval('1+1')"), vec!["eval()"]);
        assert_eq!(
            blocked_labels("const f = new Function('return 1')"),
            vec!["new Function()"]
        );
    }

    #[test]
    fn blocks_module_loading() {
        assert_eq!(blocked_labels("const fs = require('fs')"), vec!["require()"]);
        assert_eq!(blocked_labels("const m = await import('fs')"), vec!["import()"]);
        assert_eq!(
            blocked_labels("import fs from 'fs';\nreturn 1"),
            vec!["import statement"]
        );
    }

    #[test]
    fn blocks_ambient_host_access() {
        assert_eq!(blocked_labels("return process.env.HOME"), vec!["process"]);
        assert_eq!(blocked_labels("global.x = 1"), vec!["global"]);
        assert_eq!(blocked_labels("return globalThis"), vec!["globalThis"]);
        assert!(blocked_labels("x = 'child_process'").contains(&"child_process".to_string()));
    }

    #[test]
    fn member_access_still_counts_as_ambient_access() {
        assert_eq!(blocked_labels("return o.process.env"), vec!["process"]);
        assert_eq!(blocked_labels("return o.global.x"), vec!["global"]);
        assert_eq!(blocked_labels("o.process.x"), vec!["process"]);
        assert!(analyze_code("const processed = 1; const globals = 2").safe);
    }

    #[test]
    fn blocks_timers() {
        let verdict = analyze_code("setTimeout(() => {}, 10)");
        assert!(!verdict.safe);
        assert!(verdict.blocked_patterns[0].starts_with("setTimeout"));
        assert!(!analyze_code("setInterval(f, 1)").safe);
        assert!(!analyze_code("setImmediate(f)").safe);
    }

    #[test]
    fn blocks_prototype_and_reflection() {
        assert!(!analyze_code("({}).__proto__").safe);
        assert!(!analyze_code("x.constructor.constructor('return 1')()").safe);
        assert!(!analyze_code("x['constructor']").safe);
        assert!(!analyze_code("Reflect.ownKeys(x)").safe);
        assert!(!analyze_code("Object.setPrototypeOf(a, b)").safe);
        assert!(!analyze_code("Object.defineProperty(a, 'b', {})").safe);
        assert!(!analyze_code("new Proxy({}, {})").safe);
    }

    #[test]
    fn blocks_network() {
        assert!(!analyze_code("await fetch('http://example.com')").safe);
        assert!(!analyze_code("new XMLHttpRequest()").safe);
        assert!(!analyze_code("new WebSocket('ws://x')").safe);
    }

    #[test]
    fn reports_every_match() {
        let verdict = analyze_code("eval('x'); require('y'); process.exit()");
        assert_eq!(verdict.blocked_patterns.len(), 3);
    }

    #[test]
    fn safe_code_passes() {
        let verdict = analyze_code(
            "const xs = [1, 2, 3].map(x => x * 2);\nreturn xs.reduce((a, b) => a + b, 0);",
        );
        assert_eq!(
            verdict,
            SecurityVerdict {
                safe: true,
                blocked_patterns: vec![],
                warnings: vec![],
            }
        );
    }

    #[test]
    fn sdk_calls_are_safe() {
        assert!(analyze_code("return ctx.files.read('.env')").safe);
        assert!(analyze_code("return ctx.utils.countTokens('hello world')").safe);
        assert!(analyze_code("const s = await ctx.git.status(); return s.branch").safe);
    }

    #[test]
    fn warns_on_unbounded_loop_without_break() {
        let verdict = analyze_code("while (true) {}");
        assert!(verdict.safe);
        assert_eq!(verdict.warnings.len(), 1);

        let verdict = analyze_code("for (;;) { if (x) break; }");
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn warns_on_large_submission() {
        let code = format!("return '{}'", "a".repeat(LARGE_SUBMISSION_CHARS));
        let verdict = analyze_code(&code);
        assert!(verdict.safe);
        assert!(verdict.warnings[0].starts_with("Large submission"));
    }

    #[test]
    fn verdict_is_deterministic() {
        let code = "eval(1); setTimeout(f); while(true){}";
        assert_eq!(analyze_code(code), analyze_code(code));
    }
}
