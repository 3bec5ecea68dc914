//! Department/group hierarchy shown beside the employee list.
//!
//! The tree is rebuilt wholesale from the three directories whenever any of
//! them changes. Node ids are derived only from entity identifiers, so
//! expansion and selection survive a rebuild.

use crate::domain::{Department, Employee, Group};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

pub const ROOT_ID: &str = "nclock";
pub const DEPARTMENTS_ID: &str = "departments";
pub const UNASSIGNED_DEPARTMENT_ID: &str = "unassigned";
pub const GROUPS_ID: &str = "groups";
pub const UNASSIGNED_GROUP_ID: &str = "unassignedGroup";

const ROOT_LABEL: &str = "NCLOCK";
const DEPARTMENTS_LABEL: &str = "DEPARTAMENTOS";
const UNASSIGNED_DEPARTMENT_LABEL: &str = "SEM DEPARTAMENTO";
const GROUPS_LABEL: &str = "GRUPOS";
const UNASSIGNED_GROUP_LABEL: &str = "SEM GRUPO";
const FALLBACK_LABEL: &str = "Sem Nome";

const UNASSIGNED_DEPARTMENT_LEAF: &str = "unassigned-empdept-";
const UNASSIGNED_GROUP_LEAF: &str = "unassigned-empgrp-";
const EMPLOYEE_MARKER: &str = "-emp-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub label: String,
    pub children: Vec<TreeNode>,
    /// Set on employee leaves; ids may themselves contain `-emp-`.
    pub employee_id: Option<String>,
}

impl TreeNode {
    fn branch(id: impl Into<String>, label: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            children,
            employee_id: None,
        }
    }

    fn employee_leaf(id: String, employee: &Employee) -> Self {
        Self {
            id,
            label: label_or_fallback(employee.name.as_deref()),
            children: Vec::new(),
            employee_id: Some(employee.id.clone()),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Employee leaves at or below this node, depth-first.
    pub fn employee_leaves(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        collect_employee_leaves(self, &mut out);
        out
    }

    pub fn employee_leaf_ids(&self) -> Vec<&str> {
        self.employee_leaves()
            .into_iter()
            .map(|leaf| leaf.id.as_str())
            .collect()
    }
}

fn collect_employee_leaves<'a>(node: &'a TreeNode, out: &mut Vec<&'a TreeNode>) {
    if node.children.is_empty() {
        if node.employee_id.is_some() {
            out.push(node);
        }
        return;
    }
    for child in &node.children {
        collect_employee_leaves(child, out);
    }
}

fn label_or_fallback(name: Option<&str>) -> String {
    name.map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_LABEL)
        .to_string()
}

fn dedup_by_id<'a, T>(items: &'a [T], id: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(id(item).to_string()))
        .collect()
}

/// Builds the single-root hierarchy from the current directories.
pub fn build_tree(
    departments: &[Department],
    groups: &[Group],
    employees: &[Employee],
) -> Vec<TreeNode> {
    let departments = dedup_by_id(departments, |dept| dept.id.as_str());
    let groups = dedup_by_id(groups, |group| group.id.as_str());
    let employees = dedup_by_id(employees, |emp| emp.id.as_str());

    let mut root_children = Vec::with_capacity(4);

    let dept_index: HashMap<&str, usize> = departments
        .iter()
        .enumerate()
        .map(|(idx, dept)| (dept.id.as_str(), idx))
        .collect();
    let mut employees_by_dept: HashMap<usize, Vec<&Employee>> = HashMap::new();
    let mut unassigned_dept = Vec::new();
    for emp in &employees {
        match emp.department_id.as_deref() {
            Some(dept_id) => match dept_index.get(dept_id) {
                Some(idx) => employees_by_dept.entry(*idx).or_default().push(*emp),
                None => {
                    debug!(employee = %emp.id, department = dept_id, "dangling department reference");
                    unassigned_dept.push(*emp);
                }
            },
            None => unassigned_dept.push(*emp),
        }
    }

    root_children.push(TreeNode::branch(
        DEPARTMENTS_ID,
        DEPARTMENTS_LABEL,
        department_forest(&departments, &employees_by_dept),
    ));
    if !unassigned_dept.is_empty() {
        root_children.push(TreeNode::branch(
            UNASSIGNED_DEPARTMENT_ID,
            UNASSIGNED_DEPARTMENT_LABEL,
            unassigned_dept
                .iter()
                .map(|emp| {
                    TreeNode::employee_leaf(format!("{UNASSIGNED_DEPARTMENT_LEAF}{}", emp.id), emp)
                })
                .collect(),
        ));
    }

    let group_ids: HashSet<&str> = groups.iter().map(|group| group.id.as_str()).collect();
    let mut unassigned_group = Vec::new();
    for emp in &employees {
        match emp.group_id.as_deref() {
            Some(group_id) if group_ids.contains(group_id) => {}
            Some(group_id) => {
                debug!(employee = %emp.id, group = group_id, "dangling group reference");
                unassigned_group.push(*emp);
            }
            None => unassigned_group.push(*emp),
        }
    }

    let group_nodes = groups
        .iter()
        .map(|group| {
            let members = employees
                .iter()
                .filter(|emp| emp.group_id.as_deref() == Some(group.id.as_str()))
                .map(|emp| {
                    TreeNode::employee_leaf(
                        format!("group-{}{EMPLOYEE_MARKER}{}", group.id, emp.id),
                        emp,
                    )
                })
                .collect();
            TreeNode::branch(
                format!("group-{}", group.id),
                label_or_fallback(group.name.as_deref()),
                members,
            )
        })
        .collect();
    root_children.push(TreeNode::branch(GROUPS_ID, GROUPS_LABEL, group_nodes));

    if !unassigned_group.is_empty() {
        root_children.push(TreeNode::branch(
            UNASSIGNED_GROUP_ID,
            UNASSIGNED_GROUP_LABEL,
            unassigned_group
                .iter()
                .map(|emp| {
                    TreeNode::employee_leaf(format!("{UNASSIGNED_GROUP_LEAF}{}", emp.id), emp)
                })
                .collect(),
        ));
    }

    vec![TreeNode::branch(ROOT_ID, ROOT_LABEL, root_children)]
}

fn department_forest(
    departments: &[&Department],
    employees_by_dept: &HashMap<usize, Vec<&Employee>>,
) -> Vec<TreeNode> {
    // Parents are referenced by code; the first department carrying a code wins.
    let mut by_code: HashMap<&str, usize> = HashMap::new();
    for (idx, dept) in departments.iter().enumerate() {
        if let Some(code) = dept.code.as_deref() {
            by_code.entry(code).or_insert(idx);
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); departments.len()];
    let mut roots = Vec::new();
    for (idx, dept) in departments.iter().enumerate() {
        let parent = dept
            .parent_code
            .as_deref()
            .and_then(|code| by_code.get(code).copied())
            .filter(|parent| *parent != idx);
        match parent {
            Some(parent) => children[parent].push(idx),
            None => roots.push(idx),
        }
    }

    let builder = DepartmentBuilder {
        departments,
        children: &children,
        employees_by_dept,
    };
    let mut visited = vec![false; departments.len()];
    let mut forest: Vec<TreeNode> = roots
        .iter()
        .filter_map(|idx| builder.build(*idx, &mut visited))
        .collect();

    // Departments on a parent cycle are unreachable from any root.
    for idx in 0..departments.len() {
        if !visited[idx] {
            debug!(department = %departments[idx].id, "department parent chain is cyclic; promoting to root");
            if let Some(node) = builder.build(idx, &mut visited) {
                forest.push(node);
            }
        }
    }
    forest
}

struct DepartmentBuilder<'a> {
    departments: &'a [&'a Department],
    children: &'a [Vec<usize>],
    employees_by_dept: &'a HashMap<usize, Vec<&'a Employee>>,
}

impl DepartmentBuilder<'_> {
    fn build(&self, idx: usize, visited: &mut [bool]) -> Option<TreeNode> {
        if visited[idx] {
            return None;
        }
        visited[idx] = true;

        let dept = self.departments[idx];
        let mut nodes: Vec<TreeNode> = self.children[idx]
            .iter()
            .filter_map(|child| self.build(*child, visited))
            .collect();
        if let Some(members) = self.employees_by_dept.get(&idx) {
            nodes.extend(members.iter().map(|emp| {
                TreeNode::employee_leaf(
                    format!("dept-{}{EMPLOYEE_MARKER}{}", dept.id, emp.id),
                    emp,
                )
            }));
        }

        Some(TreeNode::branch(
            format!("department-{}", dept.id),
            label_or_fallback(dept.name.as_deref()),
            nodes,
        ))
    }
}

/// Recovers the employee id encoded in a leaf id, splitting at the first
/// `-emp-` after the context prefix. Ambiguous when the department or group
/// id itself contains the marker; prefer `TreeNode::employee_id`.
pub fn employee_id_from_node(id: &str) -> Option<&str> {
    let employee = if let Some(rest) = id
        .strip_prefix(UNASSIGNED_DEPARTMENT_LEAF)
        .or_else(|| id.strip_prefix(UNASSIGNED_GROUP_LEAF))
    {
        rest
    } else if let Some(rest) = id
        .strip_prefix("dept-")
        .or_else(|| id.strip_prefix("group-"))
    {
        let (_, employee) = rest.split_once(EMPLOYEE_MARKER)?;
        employee
    } else {
        return None;
    };
    (!employee.is_empty()).then_some(employee)
}

/// Every node id that has children.
pub fn branch_ids(items: &[TreeNode]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    fn walk(node: &TreeNode, out: &mut BTreeSet<String>) {
        if node.has_children() {
            out.insert(node.id.clone());
            node.children.iter().for_each(|child| walk(child, out));
        }
    }
    items.iter().for_each(|node| walk(node, &mut out));
    out
}

fn all_ids(items: &[TreeNode]) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut stack: Vec<&TreeNode> = items.iter().collect();
    while let Some(node) = stack.pop() {
        out.insert(node.id.clone());
        stack.extend(node.children.iter());
    }
    out
}

pub fn find_node<'a>(items: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    items.iter().find_map(|node| {
        if node.id == id {
            Some(node)
        } else {
            find_node(&node.children, id)
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteredTree {
    pub items: Vec<TreeNode>,
    pub expanded: BTreeSet<String>,
}

/// Prunes the tree to labels containing `term` (case-insensitive) and their
/// ancestors. A blank term keeps everything and fully expands it.
pub fn filter_tree(items: &[TreeNode], term: &str) -> FilteredTree {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return FilteredTree {
            items: items.to_vec(),
            expanded: branch_ids(items),
        };
    }

    let mut expanded = BTreeSet::new();
    let items = items
        .iter()
        .filter_map(|node| filter_node(node, &needle, &mut expanded))
        .collect();
    FilteredTree { items, expanded }
}

fn filter_node(node: &TreeNode, needle: &str, expanded: &mut BTreeSet<String>) -> Option<TreeNode> {
    let children: Vec<TreeNode> = node
        .children
        .iter()
        .filter_map(|child| filter_node(child, needle, expanded))
        .collect();
    let matches = node.label.to_lowercase().contains(needle);
    if !matches && children.is_empty() {
        return None;
    }
    if !children.is_empty() {
        expanded.insert(node.id.clone());
    }
    Some(TreeNode {
        id: node.id.clone(),
        label: node.label.clone(),
        children,
        employee_id: node.employee_id.clone(),
    })
}

/// Checked node ids. Only leaves are ever inserted by the console, but any id
/// may be toggled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Leaf id to the employee it stands for, when known.
    ids: BTreeMap<String, Option<String>>,
}

impl Selection {
    /// Flips membership of `id`; returns whether it is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id).is_some() {
            false
        } else {
            let employee = employee_id_from_node(id).map(str::to_string);
            self.ids.insert(id.to_string(), employee);
            true
        }
    }

    /// Like `toggle`, but takes the employee id from the leaf itself.
    pub fn toggle_leaf(&mut self, node: &TreeNode) -> bool {
        if self.ids.remove(&node.id).is_some() {
            false
        } else {
            self.ids.insert(node.id.clone(), node.employee_id.clone());
            true
        }
    }

    /// Selects every employee leaf under `node`, or clears them all when they
    /// already are selected.
    pub fn toggle_branch(&mut self, node: &TreeNode) -> bool {
        let leaves = node.employee_leaves();
        if leaves.is_empty() {
            return false;
        }
        if leaves.iter().all(|leaf| self.ids.contains_key(&leaf.id)) {
            for leaf in leaves {
                self.ids.remove(&leaf.id);
            }
        } else {
            self.ids.extend(
                leaves
                    .into_iter()
                    .map(|leaf| (leaf.id.clone(), leaf.employee_id.clone())),
            );
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.ids.is_empty();
        self.ids.clear();
        changed
    }

    /// Employee ids behind the selected leaves, deduplicated and sorted.
    pub fn employee_ids(&self) -> Vec<String> {
        self.ids
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn retain_existing(&mut self, items: &[TreeNode]) {
        let existing = all_ids(items);
        self.ids.retain(|id, _| existing.contains(id));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMark {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleNode {
    pub id: String,
    pub label: String,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
    pub mark: SelectionMark,
    parent: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct TreeState {
    items: Vec<TreeNode>,
    filtered: Vec<TreeNode>,
    expanded: BTreeSet<String>,
    search: String,
    selection: Selection,
    rows: Vec<VisibleNode>,
    cursor: usize,
    scroll: usize,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, departments: &[Department], groups: &[Group], employees: &[Employee]) {
        let preferred = self.cursor_id().map(str::to_string);
        self.items = build_tree(departments, groups, employees);
        self.selection.retain_existing(&self.items);
        self.apply_filter();
        self.refresh_rows(preferred.as_deref());
    }

    pub fn set_search(&mut self, term: &str) {
        if self.search == term {
            return;
        }
        self.search = term.to_string();
        let preferred = self.cursor_id().map(str::to_string);
        self.apply_filter();
        self.refresh_rows(preferred.as_deref());
    }

    fn apply_filter(&mut self) {
        let FilteredTree { items, expanded } = filter_tree(&self.items, &self.search);
        self.filtered = items;
        self.expanded = expanded;
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn items(&self) -> &[TreeNode] {
        &self.items
    }

    pub fn filtered(&self) -> &[TreeNode] {
        &self.filtered
    }

    #[cfg(test)]
    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_employee_ids(&self) -> Vec<String> {
        self.selection.employee_ids()
    }

    pub fn visible_rows(&self) -> &[VisibleNode] {
        &self.rows
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_id(&self) -> Option<&str> {
        self.rows.get(self.cursor).map(|row| row.id.as_str())
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn select_next(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
            return;
        }
        self.cursor = (self.cursor + 1) % self.rows.len();
    }

    pub fn select_prev(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
            return;
        }
        self.cursor = if self.cursor == 0 {
            self.rows.len() - 1
        } else {
            self.cursor - 1
        };
    }

    pub fn sync_scroll(&mut self, viewport_rows: usize) {
        let len = self.rows.len();
        if len == 0 {
            self.scroll = 0;
            return;
        }
        let rows = viewport_rows.max(1);
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + rows {
            self.scroll = self.cursor + 1 - rows;
        }
        self.scroll = self.scroll.min(len.saturating_sub(rows));
    }

    pub fn expand_at_cursor(&mut self) -> bool {
        let Some(row) = self.rows.get(self.cursor) else {
            return false;
        };
        if !row.has_children || row.expanded {
            return false;
        }
        let id = row.id.clone();
        self.expanded.insert(id.clone());
        self.refresh_rows(Some(&id));
        true
    }

    /// Collapses the branch under the cursor, or the parent of a leaf (moving
    /// the cursor onto it).
    pub fn collapse_at_cursor(&mut self) -> bool {
        let Some(row) = self.rows.get(self.cursor) else {
            return false;
        };
        let target = if row.has_children && row.expanded {
            self.cursor
        } else {
            match row.parent {
                Some(parent) => parent,
                None => return false,
            }
        };
        let id = self.rows[target].id.clone();
        self.expanded.remove(&id);
        self.refresh_rows(Some(&id));
        true
    }

    pub fn toggle_at_cursor(&mut self) -> bool {
        let Some(id) = self.cursor_id().map(str::to_string) else {
            return false;
        };
        let Some(node) = find_node(&self.filtered, &id) else {
            return false;
        };
        let changed = if node.has_children() {
            self.selection.toggle_branch(node)
        } else if node.employee_id.is_some() {
            self.selection.toggle_leaf(node);
            true
        } else {
            false
        };
        if changed {
            self.refresh_rows(Some(&id));
        }
        changed
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.selection.clear();
        if changed {
            let preferred = self.cursor_id().map(str::to_string);
            self.refresh_rows(preferred.as_deref());
        }
        changed
    }

    fn refresh_rows(&mut self, preferred: Option<&str>) {
        let mut rows = Vec::new();
        for node in &self.filtered {
            self.push_rows(node, 0, None, &mut rows);
        }
        self.rows = rows;

        if let Some(target) = preferred
            && let Some(idx) = self.rows.iter().position(|row| row.id == target)
        {
            self.cursor = idx;
            return;
        }
        if self.cursor >= self.rows.len() {
            self.cursor = self.rows.len().saturating_sub(1);
        }
    }

    fn push_rows(
        &self,
        node: &TreeNode,
        depth: usize,
        parent: Option<usize>,
        rows: &mut Vec<VisibleNode>,
    ) {
        let expanded = node.has_children() && self.expanded.contains(&node.id);
        let index = rows.len();
        rows.push(VisibleNode {
            id: node.id.clone(),
            label: node.label.clone(),
            depth,
            has_children: node.has_children(),
            expanded,
            mark: self.mark_for(node),
            parent,
        });
        if expanded {
            for child in &node.children {
                self.push_rows(child, depth + 1, Some(index), rows);
            }
        }
    }

    fn mark_for(&self, node: &TreeNode) -> SelectionMark {
        if !node.has_children() {
            return if self.selection.contains(&node.id) {
                SelectionMark::Full
            } else {
                SelectionMark::None
            };
        }
        let leaves = node.employee_leaf_ids();
        let selected = leaves
            .iter()
            .filter(|id| self.selection.contains(id))
            .count();
        match selected {
            0 => SelectionMark::None,
            n if n == leaves.len() => SelectionMark::Full,
            _ => SelectionMark::Partial,
        }
    }
}
