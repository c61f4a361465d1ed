//! Code-analysis mini agents.
//!
//! Each agent kind runs a cheap textual analysis over one chunk of source.
//! None of these parse the language; they are line and pattern heuristics.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::domain::errors::UnitError;
use crate::domain::models::{AgentKind, WorkUnit};
use crate::domain::ports::UnitWorker;

static FUNCTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\s+(\w+)|\bfn\s+(\w+)").expect("function pattern is valid"));
static LOOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:for|while)\s*\(|\bfor\s+\w+\s+in\b").expect("loop pattern is valid"));
static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import .* from ['"]([^'"]+)['"]"#).expect("import pattern is valid"));
static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\(['"]([^'"]+)['"]\)"#).expect("require pattern is valid"));
static USE_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+([\w:]+)").expect("use pattern is valid"));
static LOOSE_IF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"if\s*\(").expect("if pattern is valid"));
static LOOSE_ELSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\}\s*else").expect("else pattern is valid"));

/// Runs the analysis matching the agent's kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeAnalysisWorker;

#[async_trait]
impl UnitWorker for CodeAnalysisWorker {
    async fn run(&self, kind: AgentKind, unit: &WorkUnit) -> Result<Value, UnitError> {
        let code = unit.content.as_str();
        let analysis = match kind {
            AgentKind::Parser => parse(code),
            AgentKind::Validator => validate(code)?,
            AgentKind::Optimizer => optimize(code),
            AgentKind::Tester => generate_tests(code),
            AgentKind::Documenter => generate_docs(code),
            AgentKind::Refactor => refactor(code),
            AgentKind::Security => security(code),
            AgentKind::Performance => performance(code),
            AgentKind::Style => style(code),
            AgentKind::Dependency => dependencies(code),
        };
        Ok(json!({
            "agent": kind.as_str(),
            "specialization": kind.specialization(),
            "metadata": unit.metadata,
            "analysis": analysis,
        }))
    }
}

fn parse(code: &str) -> Value {
    json!({
        "tokens": code.split_whitespace().count(),
        "lines": code.lines().count(),
    })
}

/// Unbalanced brackets fail the unit.
fn validate(code: &str) -> Result<Value, UnitError> {
    let mut stack = Vec::new();
    for (line_no, line) in code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '(' | '[' | '{' => stack.push((c, line_no + 1)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(UnitError(format!(
                                "unbalanced '{c}' on line {}",
                                line_no + 1
                            )))
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((open, line)) = stack.pop() {
        return Err(UnitError(format!("unclosed '{open}' from line {line}")));
    }

    let mut warnings = Vec::new();
    if !["function", "const", "let", "fn ", "class"]
        .iter()
        .any(|kw| code.contains(kw))
    {
        warnings.push("No function or variable declarations found");
    }
    Ok(json!({ "valid": true, "warnings": warnings }))
}

fn optimize(code: &str) -> Value {
    let var_declarations = code.matches("var ").count();
    json!({
        "suggestions": var_declarations,
        "optimized": code.replace("var ", "const "),
    })
}

fn function_names(code: &str) -> Vec<String> {
    FUNCTION_NAME
        .captures_iter(code)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn generate_tests(code: &str) -> Value {
    let tests: Vec<String> = function_names(code)
        .iter()
        .map(|name| format!("test('{name} should work', () => {{ expect({name}()).toBeDefined(); }});"))
        .collect();
    json!({ "count": tests.len(), "tests": tests })
}

fn generate_docs(code: &str) -> Value {
    let docs: Vec<String> = function_names(code)
        .iter()
        .map(|name| format!("/** @function {name} */"))
        .collect();
    json!({ "count": docs.len(), "docs": docs })
}

fn refactor(code: &str) -> Value {
    let fixes = LOOSE_IF.find_iter(code).filter(|m| m.as_str() != "if (").count()
        + LOOSE_ELSE.find_iter(code).filter(|m| m.as_str() != "} else").count();
    let refactored = LOOSE_IF.replace_all(code, "if (");
    let refactored = LOOSE_ELSE.replace_all(&refactored, "} else");
    json!({ "formatting_fixes": fixes, "refactored": refactored })
}

fn security(code: &str) -> Value {
    let mut issues = Vec::new();
    if code.contains("eval(") {
        issues.push("Dangerous eval() detected");
    }
    if code.contains("innerHTML") {
        issues.push("Potential XSS via innerHTML");
    }
    let severity = if issues.is_empty() { "low" } else { "high" };
    json!({ "issues": issues, "severity": severity })
}

fn performance(code: &str) -> Value {
    let loops = LOOP.find_iter(code).count();
    let mut hints = Vec::new();
    // Consecutive loop headers within a few lines usually mean nesting
    let loop_lines: Vec<usize> = code
        .lines()
        .enumerate()
        .filter(|(_, line)| LOOP.is_match(line))
        .map(|(i, _)| i)
        .collect();
    if loop_lines.windows(2).any(|w| w[1] - w[0] <= 2) {
        hints.push("Possible nested loops");
    }
    json!({
        "loops": loops,
        "functions": function_names(code).len(),
        "hints": hints,
    })
}

fn style(code: &str) -> Value {
    let mut issues = Vec::new();
    if code.lines().any(|line| line != line.trim_end()) {
        issues.push("Trailing whitespace");
    }
    if code.lines().any(|line| line.trim().contains("  ")) {
        issues.push("Inconsistent spacing");
    }
    if !code.ends_with('\n') {
        issues.push("Missing final newline");
    }
    let score = 100usize.saturating_sub(issues.len() * 10);
    json!({ "issues": issues, "score": score })
}

fn dependencies(code: &str) -> Value {
    let collect = |re: &Regex| -> Vec<String> {
        re.captures_iter(code)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    };
    let imports = collect(&IMPORT);
    let requires = collect(&REQUIRE);
    let uses = collect(&USE_DECL);
    json!({
        "imports": imports,
        "requires": requires,
        "uses": uses,
        "total": imports.len() + requires.len() + uses.len(),
    })
}

/// Split `content` into units of at most `lines_per_chunk` lines.
pub fn chunk_lines(content: &str, lines_per_chunk: usize) -> Vec<WorkUnit> {
    let lines: Vec<&str> = content.lines().collect();
    let size = lines_per_chunk.max(1);
    lines
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            let start = i * size;
            let mut text = chunk.join("\n");
            text.push('\n');
            WorkUnit::new(format!("chunk_{i}"), text).with_metadata(json!({
                "startLine": start + 1,
                "endLine": start + chunk.len(),
            }))
        })
        .collect()
}

/// Split `content` into roughly `agent_count` equal chunks.
pub fn chunk_for_agents(content: &str, agent_count: usize) -> Vec<WorkUnit> {
    let line_count = content.lines().count();
    chunk_lines(content, line_count.div_ceil(agent_count.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn analyze(kind: AgentKind, code: &str) -> Result<Value, UnitError> {
        CodeAnalysisWorker.run(kind, &WorkUnit::new("u", code)).await
    }

    #[tokio::test]
    async fn test_parser_counts() {
        let out = analyze(AgentKind::Parser, "let a = 1;\nlet b = 2;\n").await.unwrap();
        assert_eq!(out["analysis"]["lines"], 2);
        assert_eq!(out["analysis"]["tokens"], 8);
        assert_eq!(out["agent"], "parser");
    }

    #[tokio::test]
    async fn test_validator_rejects_unbalanced() {
        let err = analyze(AgentKind::Validator, "function f() {\n  return [1, 2;\n}\n")
            .await
            .unwrap_err();
        assert!(err.0.contains("unbalanced"));
        assert!(analyze(AgentKind::Validator, "const x = { a: [1] };\n").await.is_ok());
    }

    #[tokio::test]
    async fn test_security_flags_eval() {
        let out = analyze(AgentKind::Security, "eval(input); el.innerHTML = x;").await.unwrap();
        assert_eq!(out["analysis"]["severity"], "high");
        assert_eq!(out["analysis"]["issues"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tester_finds_functions() {
        let out = analyze(AgentKind::Tester, "function alpha() {}\nfn beta() {}\n").await.unwrap();
        assert_eq!(out["analysis"]["count"], 2);
    }

    #[tokio::test]
    async fn test_style_score() {
        let out = analyze(AgentKind::Style, "let a = 1;  ").await.unwrap();
        // trailing whitespace and missing newline
        assert_eq!(out["analysis"]["score"], 80);
    }

    #[tokio::test]
    async fn test_dependencies() {
        let code = "import x from 'lodash';\nconst fs = require('fs');\nuse std::sync;\n";
        let out = analyze(AgentKind::Dependency, code).await.unwrap();
        assert_eq!(out["analysis"]["total"], 3);
    }

    #[test]
    fn test_chunk_lines() {
        let content = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let units = chunk_lines(&content, 4);
        assert_eq!(units.len(), 3);
        assert_eq!(units[2].metadata["startLine"], 9);
        assert_eq!(units[2].metadata["endLine"], 10);
        assert_eq!(chunk_for_agents(&content, 5).len(), 5);
    }
}
