//! Line-oriented static scanner for JavaScript/TypeScript test files.
//!
//! Not a parser: test declarations, imports and assertions are recognised by
//! pattern. The `// @clause ID` comment contract only needs the comment lines
//! directly above each declaration, which this gets right for formatted code.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use gatekeeper_engine::AstService;
use gatekeeper_types::{ParsedFile, ServiceResult, TestBlock};
use regex::Regex;

fn test_decl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^\s*(it|test|describe)(?:\.(?:only|skip|concurrent|each\([^)]*\)))?\s*\(\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#,
        )
        .expect("test declaration pattern is valid")
    })
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)(?:^\s*import\s+(?:[^'";]*?\s+from\s+)?|^\s*export\s+[^'";]*?\s+from\s+|\brequire\s*\(\s*|\bimport\s*\(\s*)['"]([^'"]+)['"]"#,
        )
        .expect("import pattern is valid")
    })
}

fn assertion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:expect|assert\w*|assert\.\w+)!?\s*\(").expect("assertion pattern is valid")
    })
}

fn is_comment(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("//") || t.starts_with("/*") || t.starts_with('*')
}

/// Test blocks of `source`, each with its contiguous comment lines above it.
pub fn scan_test_blocks(source: &str) -> Vec<TestBlock> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = test_decl_pattern().captures(line) else {
            continue;
        };
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let mut comments = Vec::new();
        let mut above = idx;
        while above > 0 && is_comment(lines[above - 1]) {
            above -= 1;
            comments.push(lines[above].trim().to_string());
        }
        comments.reverse();

        blocks.push(TestBlock {
            name,
            start_line: idx + 1,
            preceding_comments: comments,
        });
    }
    blocks
}

/// Module specifiers imported by `source`, in first-seen order.
pub fn scan_imports(source: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in import_pattern().captures_iter(source) {
        let spec = caps[1].to_string();
        if !seen.contains(&spec) {
            seen.push(spec);
        }
    }
    seen
}

pub fn count_assertions(source: &str) -> usize {
    source
        .lines()
        .filter(|l| !is_comment(l))
        .map(|l| assertion_pattern().find_iter(l).count())
        .sum()
}

/// `AstService` reading files relative to a project root.
#[derive(Clone, Debug)]
pub struct TagScanner {
    root: PathBuf,
}

impl TagScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read(&self, path: &str) -> ServiceResult<String> {
        Ok(tokio::fs::read_to_string(self.root.join(path)).await?)
    }
}

#[async_trait]
impl AstService for TagScanner {
    async fn parse_file(&self, path: &str) -> ServiceResult<ParsedFile> {
        let source = self.read(path).await?;
        // Suites group tests; only `it` and `test` count.
        let test_count = source
            .lines()
            .filter_map(|l| test_decl_pattern().captures(l))
            .filter(|caps| &caps[1] != "describe")
            .count();
        Ok(ParsedFile {
            path: path.to_string(),
            line_count: source.lines().count(),
            test_count,
            assertion_count: count_assertions(&source),
        })
    }

    async fn imports(&self, path: &str) -> ServiceResult<Vec<String>> {
        Ok(scan_imports(&self.read(path).await?))
    }

    async fn test_blocks_with_comments(&self, path: &str) -> ServiceResult<Vec<TestBlock>> {
        Ok(scan_test_blocks(&self.read(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import { login } from '../src/login';
import type { Token } from "./types";
const helpers = require('./helpers');

describe('login', () => {
  // @clause CL-1
  // happy path
  it('returns a token', () => {
    expect(login('a', 'b')).toBeTruthy();
  });

  /* @clause CL-2 */
  test.skip("rejects bad passwords", async () => {
    // expect(nothing) in a comment
    await expect(login('a', 'x')).rejects.toThrow();
  });

  it(`has no tags`, () => {
    assert.equal(1, 1);
  });
});
"#;

    #[test]
    fn finds_blocks_with_their_comments() {
        let blocks = scan_test_blocks(SAMPLE);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["login", "returns a token", "rejects bad passwords", "has no tags"]);
        assert_eq!(blocks[1].preceding_comments, ["// @clause CL-1", "// happy path"]);
        assert_eq!(blocks[1].start_line, 8);
        assert_eq!(blocks[2].preceding_comments, ["/* @clause CL-2 */"]);
        assert!(blocks[3].preceding_comments.is_empty());
    }

    #[test]
    fn finds_imports() {
        assert_eq!(scan_imports(SAMPLE), ["../src/login", "./types", "./helpers"]);
        assert_eq!(scan_imports("import 'side-effect';\nawait import(\"./lazy\");"), ["side-effect", "./lazy"]);
    }

    #[test]
    fn counts_assertions_outside_comments() {
        assert_eq!(count_assertions(SAMPLE), 3);
        assert_eq!(count_assertions("it('x', () => {});"), 0);
    }

    #[tokio::test]
    async fn parse_file_summarises_tests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("login.test.ts"), SAMPLE).unwrap();
        let scanner = TagScanner::new(dir.path());

        let parsed = scanner.parse_file("login.test.ts").await.unwrap();
        assert_eq!(parsed.test_count, 3);
        assert_eq!(parsed.assertion_count, 3);
        assert_eq!(parsed.line_count, SAMPLE.lines().count());

        let blocks = scanner.test_blocks_with_comments("login.test.ts").await.unwrap();
        assert_eq!(blocks.len(), 4);
        assert!(scanner.parse_file("missing.ts").await.is_err());
    }
}
