// Copyright 2025 The Debugpod Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Field extraction from runtime inspection output.
//!
//! Neither YAML from `crictl inspect` nor JSON from `runc state` is parsed
//! structurally, since their layout is not stable across runtime versions.
//! Instead the scan runs in two passes: the leading whitespace of the first
//! indented line is taken as the indent unit, then the field is looked up on
//! lines indented by exactly that unit.

/// Looks up a top-level field of an inspection document.
pub trait FieldScanner: Send + Sync {
    /// Value of `key`, with surrounding quotes and trailing commas removed.
    fn field(&self, document: &str, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndentScanner;

impl IndentScanner {
    /// Leading whitespace of the first indented, non-blank line.
    pub fn indent_unit(document: &str) -> Option<&str> {
        document.lines().find_map(|line| {
            let content = line.trim_start_matches([' ', '\t']);
            let indent = &line[..line.len() - content.len()];
            (!indent.is_empty() && !content.trim().is_empty()).then_some(indent)
        })
    }

    fn match_field<'a>(line: &'a str, indent: &str, key: &str) -> Option<&'a str> {
        let rest = line.strip_prefix(indent)?;
        if rest.starts_with([' ', '\t']) {
            return None;
        }
        let rest = match rest.strip_prefix('"') {
            Some(quoted) => quoted.strip_prefix(key)?.strip_prefix('"')?,
            None => rest.strip_prefix(key)?,
        };
        let value = rest.trim_start().strip_prefix(':')?;
        let value = value.trim().trim_end_matches(',').trim_end();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then_some(value)
    }
}

impl FieldScanner for IndentScanner {
    fn field(&self, document: &str, key: &str) -> Option<String> {
        let indent = Self::indent_unit(document)?;
        document
            .lines()
            .find_map(|line| Self::match_field(line, indent, key))
            .map(str::to_string)
    }
}
