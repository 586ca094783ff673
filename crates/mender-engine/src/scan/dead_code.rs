//! Unused ES imports.
//!
//! A binding counts as used when the same identifier token appears anywhere
//! outside the import statement that declares it. Comments and string
//! contents are blanked first, so a name mentioned only in a comment still
//! reports.

use super::files::source_files;
use super::SOURCE_DEAD_CODE;
use mender_core::util::literal_regex;
use mender_core::{Issue, IssueType};
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

fn import_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        literal_regex(
            r#"(?m)^[ \t]*import[ \t]+(?P<type>type[ \t]+)?(?P<clause>[^'";]+?)[ \t\r\n]+from[ \t]+['"](?P<module>[^'"]+)['"][ \t]*;?"#,
        )
    })
}

fn identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"[A-Za-z_$][A-Za-z0-9_$]*"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub module: String,
    pub line: u32,
}

/// Local names bound by an import clause such as `React, { useState as s }`.
fn clause_bindings(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let (head, braces) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{}{}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(ns) = part.strip_prefix('*') {
            if let Some(name) = ns.trim().strip_prefix("as") {
                names.push(name.trim().to_string());
            }
        } else {
            names.push(part.to_string());
        }
    }
    if let Some(inner) = braces {
        for spec in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let spec = spec.strip_prefix("type ").unwrap_or(spec).trim();
            let local = match spec.split_once(" as ") {
                Some((_, local)) => local.trim(),
                None => spec,
            };
            names.push(local.to_string());
        }
    }
    names
        .into_iter()
        .filter(|n| identifier().find(n).is_some_and(|m| m.as_str() == n.as_str()))
        .collect()
}

fn blank_comments(source: &str) -> String {
    blank(source, false)
}

fn blank_comments_and_strings(source: &str) -> String {
    blank(source, true)
}

/// Replace comments (and, with `strings`, string literal contents) with
/// spaces, keeping newlines so line numbers stay put. Template literal
/// text is kept since `${}` holes reference bindings.
fn blank(source: &str, strings: bool) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Line,
        Block,
        Quote(char),
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '/' if chars.peek() == Some(&'/') => {
                    state = State::Line;
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::Block;
                    out.push(' ');
                }
                '\'' | '"' => {
                    state = State::Quote(ch);
                    out.push(ch);
                }
                _ => out.push(ch),
            },
            State::Line => {
                if ch == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::Block => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    out.push(if ch == '\n' { '\n' } else { ' ' });
                }
            }
            State::Quote(quote) => {
                if ch == '\\' {
                    out.push(if strings { ' ' } else { ch });
                    if let Some(next) = chars.next() {
                        out.push(if next == '\n' || !strings { next } else { ' ' });
                    }
                } else if ch == quote || ch == '\n' {
                    state = State::Code;
                    out.push(ch);
                } else {
                    out.push(if strings { ' ' } else { ch });
                }
            }
        }
    }
    out
}

fn line_of(source: &str, offset: usize) -> u32 {
    source[..offset].matches('\n').count() as u32 + 1
}

/// Imports in `source` whose binding is never referenced.
pub fn unused_imports(source: &str) -> Vec<ImportBinding> {
    let code = blank_comments(source);
    let mut imports = Vec::new();
    let mut spans = Vec::new();
    for caps in import_statement().captures_iter(&code) {
        let (Some(whole), Some(clause), Some(module)) =
            (caps.get(0), caps.name("clause"), caps.name("module"))
        else {
            continue;
        };
        spans.push(whole.range());
        let indent = whole.as_str().len() - whole.as_str().trim_start().len();
        let line = line_of(&code, whole.start() + indent);
        for local in clause_bindings(clause.as_str()) {
            imports.push(ImportBinding {
                local,
                module: module.as_str().to_string(),
                line,
            });
        }
    }
    if imports.is_empty() {
        return imports;
    }

    let mut rest = code.clone();
    for span in &spans {
        rest.replace_range(span.clone(), &" ".repeat(span.len()));
    }
    let rest = blank_comments_and_strings(&rest);
    let used: HashSet<&str> = identifier().find_iter(&rest).map(|m| m.as_str()).collect();

    imports
        .into_iter()
        .filter(|binding| !used.contains(binding.local.as_str()))
        .collect()
}

fn issues_for(file: &Path, source: &str) -> Vec<Issue> {
    unused_imports(source)
        .into_iter()
        .map(|binding| {
            Issue::new(
                IssueType::DeadCode,
                file.to_path_buf(),
                format!("Unused import '{}' from '{}'", binding.local, binding.module),
            )
            .with_location(Some(binding.line), None)
            .with_rule("unused-import")
            .with_source(SOURCE_DEAD_CODE)
        })
        .collect()
}

/// One file, for validation.
pub fn scan_file(root: &Path, file: &Path) -> std::io::Result<Vec<Issue>> {
    let source = std::fs::read_to_string(root.join(file))?;
    Ok(issues_for(file, &source))
}

pub fn scan_tree(root: &Path) -> Vec<Issue> {
    source_files(root)
        .par_iter()
        .flat_map_iter(|file| match std::fs::read_to_string(root.join(file)) {
            Ok(source) => issues_for(file, &source),
            Err(_) => Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locals(source: &str) -> Vec<String> {
        unused_imports(source).into_iter().map(|b| b.local).collect()
    }

    #[test]
    fn reports_unused_named_default_and_namespace_imports() {
        let source = "import React, { useState, useEffect as effect } from 'react';\n\
                      import * as path from 'path';\n\
                      import type { Props } from './types';\n\
                      \n\
                      export function App(p: Props) {\n\
                      \x20 const [v] = useState(0);\n\
                      \x20 return v;\n\
                      }\n";
        assert_eq!(locals(source), vec!["React", "effect", "path"]);
    }

    #[test]
    fn substring_matches_do_not_count_as_use() {
        let source = "import { map } from 'lodash';\nconst mapping = 1;\nexport default mapping;\n";
        assert_eq!(locals(source), vec!["map"]);
    }

    #[test]
    fn comments_and_strings_do_not_count_as_use() {
        let source = "import { a, b, c } from './m';\n// a is handy\nconst s = 'b';\nexport const t = `${c}`;\n";
        assert_eq!(locals(source), vec!["a", "b"]);
    }

    #[test]
    fn commented_out_imports_are_not_imports() {
        let source = "/*\nimport { gone } from './old';\n*/\n// import { also } from './old';\nimport { kept } from './new';\nexport default 1;\n";
        let unused = unused_imports(source);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].local, "kept");
        assert_eq!(unused[0].module, "./new");
        assert_eq!(unused[0].line, 5);
    }

    #[test]
    fn multi_line_imports_report_the_statement_line() {
        let source = "const x = 1;\nimport {\n  one,\n  two,\n} from './n';\nexport default one + x;\n";
        let unused = unused_imports(source);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].local, "two");
        assert_eq!(unused[0].line, 2);
    }

    #[test]
    fn scans_tree_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "import { x } from './x';\n").unwrap();
        std::fs::write(dir.path().join("src/b.ts"), "import { y } from './y';\ny();\n").unwrap();
        let issues = scan_tree(dir.path());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, Path::new("src/a.ts"));
        assert_eq!(issues[0].kind, IssueType::DeadCode);
        assert_eq!(issues[0].line, Some(1));
    }
}
