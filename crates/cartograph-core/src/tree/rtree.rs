//! Minimal in-memory R-tree over [`Extent`] boxes.
//!
//! Guttman's quadratic split with at most [`MAX_ENTRIES`] children per node.
//! Removal needs the box the item was inserted with; underfull nodes are
//! dissolved and their entries reinserted.

use std::mem;

use crate::model::Extent;

const MAX_ENTRIES: usize = 9;
const MIN_ENTRIES: usize = 4;

#[derive(Debug, Clone)]
struct Entry<T> {
    bbox: Extent,
    item: T,
}

#[derive(Debug, Clone)]
enum Children<T> {
    Leaf(Vec<Entry<T>>),
    Branch(Vec<Node<T>>),
}

#[derive(Debug, Clone)]
struct Node<T> {
    bbox: Extent,
    children: Children<T>,
}

impl<T> Node<T> {
    fn leaf(entries: Vec<Entry<T>>) -> Self {
        let mut node = Self {
            bbox: Extent::empty(),
            children: Children::Leaf(entries),
        };
        node.recompute_bbox();
        node
    }

    fn branch(children: Vec<Self>) -> Self {
        let mut node = Self {
            bbox: Extent::empty(),
            children: Children::Branch(children),
        };
        node.recompute_bbox();
        node
    }

    fn len(&self) -> usize {
        match &self.children {
            Children::Leaf(entries) => entries.len(),
            Children::Branch(children) => children.len(),
        }
    }

    fn recompute_bbox(&mut self) {
        self.bbox = match &self.children {
            Children::Leaf(entries) => entries
                .iter()
                .fold(Extent::empty(), |acc, e| acc.extend(&e.bbox)),
            Children::Branch(children) => children
                .iter()
                .fold(Extent::empty(), |acc, c| acc.extend(&c.bbox)),
        };
    }

    fn drain_into(self, out: &mut Vec<Entry<T>>) {
        match self.children {
            Children::Leaf(entries) => out.extend(entries),
            Children::Branch(children) => {
                for child in children {
                    child.drain_into(out);
                }
            }
        }
    }
}

fn enlargement(bbox: &Extent, with: &Extent) -> f64 {
    bbox.extend(with).area() - bbox.area()
}

/// Index of the child needing the least enlargement to cover `bbox`.
fn choose_subtree<T>(children: &[Node<T>], bbox: &Extent) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let cost = (enlargement(&child.bbox, bbox), child.bbox.area());
        if cost.0 < best_cost.0 || (cost.0 == best_cost.0 && cost.1 < best_cost.1) {
            best = i;
            best_cost = cost;
        }
    }
    best
}

/// Split `items` into two groups with the quadratic seed heuristic.
fn quadratic_split<E>(items: Vec<E>, bbox_of: impl Fn(&E) -> Extent) -> (Vec<E>, Vec<E>) {
    let boxes: Vec<Extent> = items.iter().map(&bbox_of).collect();
    let (mut seed_a, mut seed_b, mut worst) = (0, 1, f64::NEG_INFINITY);
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            let waste = boxes[i].extend(&boxes[j]).area() - boxes[i].area() - boxes[j].area();
            if waste > worst {
                (seed_a, seed_b, worst) = (i, j, waste);
            }
        }
    }

    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    let mut box_a = boxes[seed_a];
    let mut box_b = boxes[seed_b];
    let total = items.len();
    let mut remaining: Vec<(usize, E)> = Vec::with_capacity(total);
    for (i, item) in items.into_iter().enumerate() {
        if i == seed_a {
            group_a.push(item);
        } else if i == seed_b {
            group_b.push(item);
        } else {
            remaining.push((i, item));
        }
    }

    while let Some(pos) = pick_next(&remaining, &boxes, &box_a, &box_b) {
        let left = remaining.len();
        let (i, item) = remaining.swap_remove(pos);
        let to_a = if group_a.len() + left <= MIN_ENTRIES {
            true
        } else if group_b.len() + left <= MIN_ENTRIES {
            false
        } else {
            let grow_a = enlargement(&box_a, &boxes[i]);
            let grow_b = enlargement(&box_b, &boxes[i]);
            grow_a < grow_b || (grow_a == grow_b && group_a.len() <= group_b.len())
        };
        if to_a {
            box_a = box_a.extend(&boxes[i]);
            group_a.push(item);
        } else {
            box_b = box_b.extend(&boxes[i]);
            group_b.push(item);
        }
    }
    (group_a, group_b)
}

/// Remaining entry with the strongest preference for one group.
fn pick_next<E>(remaining: &[(usize, E)], boxes: &[Extent], a: &Extent, b: &Extent) -> Option<usize> {
    remaining
        .iter()
        .enumerate()
        .map(|(pos, (i, _))| {
            let diff = (enlargement(a, &boxes[*i]) - enlargement(b, &boxes[*i])).abs();
            (pos, diff)
        })
        .max_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(pos, _)| pos)
}

fn split<T>(node: &mut Node<T>) -> Node<T> {
    let sibling = match &mut node.children {
        Children::Leaf(entries) => {
            let (keep, moved) = quadratic_split(mem::take(entries), |e| e.bbox);
            *entries = keep;
            Node::leaf(moved)
        }
        Children::Branch(children) => {
            let (keep, moved) = quadratic_split(mem::take(children), |c| c.bbox);
            *children = keep;
            Node::branch(moved)
        }
    };
    node.recompute_bbox();
    sibling
}

fn insert_into<T>(node: &mut Node<T>, entry: Entry<T>) -> Option<Node<T>> {
    node.bbox = node.bbox.extend(&entry.bbox);
    let overflow = match &mut node.children {
        Children::Leaf(entries) => {
            entries.push(entry);
            entries.len() > MAX_ENTRIES
        }
        Children::Branch(children) if children.is_empty() => {
            children.push(Node::leaf(vec![entry]));
            false
        }
        Children::Branch(children) => {
            let idx = choose_subtree(children, &entry.bbox);
            if let Some(sibling) = insert_into(&mut children[idx], entry) {
                children.push(sibling);
            }
            children.len() > MAX_ENTRIES
        }
    };
    overflow.then(|| split(node))
}

fn remove_from<T: PartialEq>(
    node: &mut Node<T>,
    bbox: &Extent,
    item: &T,
    orphans: &mut Vec<Entry<T>>,
) -> bool {
    if !node.bbox.contains(bbox) {
        return false;
    }
    let found = match &mut node.children {
        Children::Leaf(entries) => match entries.iter().position(|e| &e.item == item) {
            Some(pos) => {
                entries.swap_remove(pos);
                true
            }
            None => false,
        },
        Children::Branch(children) => {
            let mut found = false;
            for i in 0..children.len() {
                if remove_from(&mut children[i], bbox, item, orphans) {
                    if children[i].len() < MIN_ENTRIES {
                        children.swap_remove(i).drain_into(orphans);
                    }
                    found = true;
                    break;
                }
            }
            found
        }
    };
    if found {
        node.recompute_bbox();
    }
    found
}

fn search_into<T: Clone>(node: &Node<T>, bbox: &Extent, out: &mut Vec<T>) {
    if !node.bbox.intersects(bbox) {
        return;
    }
    match &node.children {
        Children::Leaf(entries) => {
            out.extend(
                entries
                    .iter()
                    .filter(|e| e.bbox.intersects(bbox))
                    .map(|e| e.item.clone()),
            );
        }
        Children::Branch(children) => {
            for child in children {
                search_into(child, bbox, out);
            }
        }
    }
}

/// R-tree of items keyed by their bounding box.
#[derive(Debug, Clone)]
pub struct RTree<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self {
            root: Node::leaf(Vec::new()),
            len: 0,
        }
    }
}

impl<T: Clone + PartialEq> RTree<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `item` under a non-empty `bbox`. Empty boxes are ignored.
    pub fn insert(&mut self, bbox: Extent, item: T) {
        if bbox.is_empty() {
            return;
        }
        self.insert_entry(Entry { bbox, item });
        self.len += 1;
    }

    fn insert_entry(&mut self, entry: Entry<T>) {
        if let Some(sibling) = insert_into(&mut self.root, entry) {
            let old_root = mem::replace(&mut self.root, Node::leaf(Vec::new()));
            self.root = Node::branch(vec![old_root, sibling]);
        }
    }

    /// Remove `item`, which must have been inserted with exactly `bbox`.
    pub fn remove(&mut self, bbox: &Extent, item: &T) -> bool {
        let mut orphans = Vec::new();
        if !remove_from(&mut self.root, bbox, item, &mut orphans) {
            return false;
        }
        self.len -= 1;
        // Collapse a root left with a single branch child.
        loop {
            let single = match &mut self.root.children {
                Children::Branch(children) if children.len() == 1 => children.pop(),
                _ => None,
            };
            match single {
                Some(child) => self.root = child,
                None => break,
            }
        }
        for entry in orphans {
            self.insert_entry(entry);
        }
        true
    }

    /// Items whose boxes intersect `bbox` (inclusive bounds).
    #[must_use]
    pub fn search(&self, bbox: &Extent) -> Vec<T> {
        let mut out = Vec::new();
        search_into(&self.root, bbox, &mut out);
        out
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
