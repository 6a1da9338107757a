//! Hierarchical named test tree.
//!
//! Families build a [`TestGroup`] of cases; the runner walks it and
//! addresses each case by its dot-joined path (`pipeline.timestamp.misc_tests.timestamp_only`).

use std::collections::HashSet;

pub enum TestNode<T> {
    Group(TestGroup<T>),
    Case { name: String, case: T },
}

impl<T> TestNode<T> {
    pub fn name(&self) -> &str {
        match self {
            TestNode::Group(g) => &g.name,
            TestNode::Case { name, .. } => name,
        }
    }
}

impl<T> From<TestGroup<T>> for TestNode<T> {
    fn from(group: TestGroup<T>) -> Self {
        TestNode::Group(group)
    }
}

pub struct TestGroup<T> {
    pub name: String,
    pub description: String,
    pub children: Vec<TestNode<T>>,
}

impl<T> TestGroup<T> {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: impl Into<TestNode<T>>) {
        self.children.push(child.into());
    }

    pub fn add_case(&mut self, name: impl Into<String>, case: T) {
        self.children.push(TestNode::Case {
            name: name.into(),
            case,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of leaf cases below this group.
    pub fn case_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| match c {
                TestNode::Group(g) => g.case_count(),
                TestNode::Case { .. } => 1,
            })
            .sum()
    }

    /// Visit every case in declaration order with its full path.
    pub fn for_each_case<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&str, &'a T),
    {
        self.walk(&self.name, f);
    }

    fn walk<'a, F>(&'a self, prefix: &str, f: &mut F)
    where
        F: FnMut(&str, &'a T),
    {
        for child in &self.children {
            match child {
                TestNode::Group(g) => g.walk(&format!("{}.{}", prefix, g.name), f),
                TestNode::Case { name, case } => f(&format!("{}.{}", prefix, name), case),
            }
        }
    }

    /// All case paths with their cases, in declaration order.
    pub fn cases(&self) -> Vec<(String, &T)> {
        let mut out = Vec::new();
        self.for_each_case(&mut |path, case| out.push((path.to_string(), case)));
        out
    }

    /// Look a case up by its full path.
    pub fn find(&self, path: &str) -> Option<&T> {
        let mut parts = path.split('.');
        if parts.next()? != self.name {
            return None;
        }
        let mut group = self;
        let rest: Vec<&str> = parts.collect();
        for (i, part) in rest.iter().enumerate() {
            let child = group.children.iter().find(|c| c.name() == *part)?;
            match child {
                TestNode::Group(g) => group = g,
                TestNode::Case { case, .. } => {
                    return (i + 1 == rest.len()).then_some(case);
                }
            }
        }
        None
    }

    /// First path that occurs more than once, if any.
    pub fn find_duplicate_path(&self) -> Option<String> {
        let mut seen = HashSet::new();
        let mut dup = None;
        self.for_each_case(&mut |path, _| {
            if dup.is_none() && !seen.insert(path.to_string()) {
                dup = Some(path.to_string());
            }
        });
        dup
    }
}

// ── Filtering ───────────────────────────────────────────────────────────────

/// Include/exclude glob filter over case paths. `*` matches any run of
/// characters, including dots.
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TestFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn matches(&self, path: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|p| glob_match(p, path));
        included && !self.exclude.iter().any(|p| glob_match(p, path))
    }
}

/// Minimal `*` glob matcher.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}
