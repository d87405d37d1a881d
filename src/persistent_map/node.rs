use std::sync::Arc;

/// A link to a subtree. `None` is the empty tree.
pub(crate) type Link<V> = Option<Arc<Node<V>>>;

/// An immutable node of a 2-3 search tree, keyed by signed 64-bit integers.
///
/// A `Two` node holds one key and (if not a leaf) two children; a `Three`
/// node holds two keys and (if not a leaf) three children. Every modified
/// root-to-leaf path produces brand new nodes; untouched subtrees are shared
/// by `Arc` with whatever snapshot or builder they were forked from.
pub(crate) enum Node<V> {
    Two {
        key: i64,
        value: Arc<V>,
        left: Link<V>,
        right: Link<V>,
        size: usize,
    },
    Three {
        key1: i64,
        value1: Arc<V>,
        key2: i64,
        value2: Arc<V>,
        left: Link<V>,
        mid: Link<V>,
        right: Link<V>,
        size: usize,
    },
}

pub(crate) fn size_of<V>(link: &Link<V>) -> usize {
    match link {
        None => 0,
        Some(node) => node.size(),
    }
}

impl<V> Node<V> {
    pub(crate) fn size(&self) -> usize {
        match self {
            Node::Two { size, .. } => *size,
            Node::Three { size, .. } => *size,
        }
    }
}

pub(crate) fn two<V>(key: i64, value: Arc<V>, left: Link<V>, right: Link<V>) -> Arc<Node<V>> {
    let size = 1 + size_of(&left) + size_of(&right);
    Arc::new(Node::Two {
        key,
        value,
        left,
        right,
        size,
    })
}

pub(crate) fn three<V>(
    key1: i64,
    value1: Arc<V>,
    key2: i64,
    value2: Arc<V>,
    left: Link<V>,
    mid: Link<V>,
    right: Link<V>,
) -> Arc<Node<V>> {
    let size = 2 + size_of(&left) + size_of(&mid) + size_of(&right);
    Arc::new(Node::Three {
        key1,
        value1,
        key2,
        value2,
        left,
        mid,
        right,
        size,
    })
}

pub(crate) fn get<'a, V>(link: &'a Link<V>, key: i64) -> Option<&'a V> {
    let mut current = link;
    loop {
        match current {
            None => return None,
            Some(node) => match node.as_ref() {
                Node::Two {
                    key: k,
                    value,
                    left,
                    right,
                    ..
                } => {
                    if key == *k {
                        return Some(value.as_ref());
                    } else if key < *k {
                        current = left;
                    } else {
                        current = right;
                    }
                }
                Node::Three {
                    key1,
                    value1,
                    key2,
                    value2,
                    left,
                    mid,
                    right,
                    ..
                } => {
                    if key == *key1 {
                        return Some(value1.as_ref());
                    } else if key == *key2 {
                        return Some(value2.as_ref());
                    } else if key < *key1 {
                        current = left;
                    } else if key < *key2 {
                        current = mid;
                    } else {
                        current = right;
                    }
                }
            },
        }
    }
}

/// Outcome of inserting into a subtree: either the subtree was rebuilt in
/// place, or it overflowed into a temporary 4-node which must be split and
/// handed to the caller as `(left, split_key, split_value, right)`.
pub(crate) enum InsertResult<V> {
    Done(Arc<Node<V>>),
    Split(Arc<Node<V>>, i64, Arc<V>, Arc<Node<V>>),
}

pub(crate) fn insert<V>(link: &Link<V>, key: i64, value: Arc<V>) -> Link<V> {
    match insert_link(link, key, value) {
        InsertResult::Done(node) => Some(node),
        InsertResult::Split(left, split_key, split_value, right) => {
            Some(two(split_key, split_value, Some(left), Some(right)))
        }
    }
}

fn insert_link<V>(link: &Link<V>, key: i64, value: Arc<V>) -> InsertResult<V> {
    match link {
        None => InsertResult::Done(two(key, value, None, None)),
        Some(node) => insert_node(node, key, value),
    }
}

fn insert_node<V>(node: &Arc<Node<V>>, key: i64, value: Arc<V>) -> InsertResult<V> {
    match node.as_ref() {
        Node::Two {
            key: k,
            value: v,
            left,
            right,
            ..
        } => {
            if left.is_none() && right.is_none() {
                if key == *k {
                    InsertResult::Done(two(key, value, None, None))
                } else if key < *k {
                    InsertResult::Done(three(key, value, *k, v.clone(), None, None, None))
                } else {
                    InsertResult::Done(three(*k, v.clone(), key, value, None, None, None))
                }
            } else if key == *k {
                InsertResult::Done(two(*k, value, left.clone(), right.clone()))
            } else if key < *k {
                match insert_link(left, key, value) {
                    InsertResult::Done(new_left) => {
                        InsertResult::Done(two(*k, v.clone(), Some(new_left), right.clone()))
                    }
                    InsertResult::Split(sl, sk, sv, sr) => InsertResult::Done(three(
                        sk,
                        sv,
                        *k,
                        v.clone(),
                        Some(sl),
                        Some(sr),
                        right.clone(),
                    )),
                }
            } else {
                match insert_link(right, key, value) {
                    InsertResult::Done(new_right) => {
                        InsertResult::Done(two(*k, v.clone(), left.clone(), Some(new_right)))
                    }
                    InsertResult::Split(sl, sk, sv, sr) => InsertResult::Done(three(
                        *k,
                        v.clone(),
                        sk,
                        sv,
                        left.clone(),
                        Some(sl),
                        Some(sr),
                    )),
                }
            }
        }
        Node::Three {
            key1,
            value1,
            key2,
            value2,
            left,
            mid,
            right,
            ..
        } => {
            let (k1, v1, k2, v2) = (*key1, value1.clone(), *key2, value2.clone());
            if left.is_none() && mid.is_none() && right.is_none() {
                if key == k1 {
                    InsertResult::Done(three(key, value, k2, v2, None, None, None))
                } else if key == k2 {
                    InsertResult::Done(three(k1, v1, key, value, None, None, None))
                } else if key < k1 {
                    InsertResult::Split(
                        two(key, value, None, None),
                        k1,
                        v1,
                        two(k2, v2, None, None),
                    )
                } else if key < k2 {
                    InsertResult::Split(
                        two(k1, v1, None, None),
                        key,
                        value,
                        two(k2, v2, None, None),
                    )
                } else {
                    InsertResult::Split(
                        two(k1, v1, None, None),
                        k2,
                        v2,
                        two(key, value, None, None),
                    )
                }
            } else if key == k1 {
                InsertResult::Done(three(
                    k1,
                    value,
                    k2,
                    v2,
                    left.clone(),
                    mid.clone(),
                    right.clone(),
                ))
            } else if key == k2 {
                InsertResult::Done(three(
                    k1,
                    v1,
                    k2,
                    value,
                    left.clone(),
                    mid.clone(),
                    right.clone(),
                ))
            } else if key < k1 {
                match insert_link(left, key, value) {
                    InsertResult::Done(new_left) => InsertResult::Done(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        Some(new_left),
                        mid.clone(),
                        right.clone(),
                    )),
                    InsertResult::Split(sl, sk, sv, sr) => InsertResult::Split(
                        two(sk, sv, Some(sl), Some(sr)),
                        k1,
                        v1,
                        two(k2, v2, mid.clone(), right.clone()),
                    ),
                }
            } else if key < k2 {
                match insert_link(mid, key, value) {
                    InsertResult::Done(new_mid) => InsertResult::Done(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        left.clone(),
                        Some(new_mid),
                        right.clone(),
                    )),
                    InsertResult::Split(sl, sk, sv, sr) => InsertResult::Split(
                        two(k1, v1, left.clone(), Some(sl)),
                        sk,
                        sv,
                        two(k2, v2, Some(sr), right.clone()),
                    ),
                }
            } else {
                match insert_link(right, key, value) {
                    InsertResult::Done(new_right) => InsertResult::Done(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        left.clone(),
                        mid.clone(),
                        Some(new_right),
                    )),
                    InsertResult::Split(sl, sk, sv, sr) => InsertResult::Split(
                        two(k1, v1, left.clone(), mid.clone()),
                        k2,
                        v2,
                        two(sk, sv, Some(sl), Some(sr)),
                    ),
                }
            }
        }
    }
}

/// Outcome of deleting from a subtree. `underflow` means this subtree is now
/// exactly one level shorter than its former depth required and the caller
/// must rebalance against a sibling (rotate, or merge and keep propagating).
pub(crate) struct DeleteOutcome<V> {
    pub(crate) new_link: Link<V>,
    pub(crate) underflow: bool,
    pub(crate) removed: Option<Arc<V>>,
}

fn unchanged<V>(link: Link<V>) -> DeleteOutcome<V> {
    DeleteOutcome {
        new_link: link,
        underflow: false,
        removed: None,
    }
}

fn tree_max<V>(node: &Arc<Node<V>>) -> (i64, Arc<V>) {
    match node.as_ref() {
        Node::Two { key, value, right, .. } => match right {
            Some(r) => tree_max(r),
            None => (*key, value.clone()),
        },
        Node::Three {
            key2, value2, right, ..
        } => match right {
            Some(r) => tree_max(r),
            None => (*key2, value2.clone()),
        },
    }
}

pub(crate) fn delete<V>(link: &Link<V>, key: i64) -> DeleteOutcome<V> {
    match link {
        None => unchanged(None),
        Some(node) => delete_node(node, key),
    }
}

fn delete_node<V>(node: &Arc<Node<V>>, key: i64) -> DeleteOutcome<V> {
    match node.as_ref() {
        Node::Two {
            key: k,
            value: v,
            left,
            right,
            ..
        } => {
            if left.is_none() && right.is_none() {
                if key == *k {
                    DeleteOutcome {
                        new_link: None,
                        underflow: true,
                        removed: Some(v.clone()),
                    }
                } else {
                    unchanged(Some(node.clone()))
                }
            } else if key == *k {
                let (pk, pv) = tree_max(left.as_ref().unwrap());
                let sub = delete(left, pk);
                let outcome = if !sub.underflow {
                    unchanged(Some(two(pk, pv, sub.new_link, right.clone())))
                } else {
                    fix_two_left(pk, pv, sub.new_link, right.clone().unwrap())
                };
                DeleteOutcome {
                    removed: Some(v.clone()),
                    ..outcome
                }
            } else if key < *k {
                let sub = delete(left, key);
                let outcome = if !sub.underflow {
                    unchanged(Some(two(*k, v.clone(), sub.new_link, right.clone())))
                } else {
                    fix_two_left(*k, v.clone(), sub.new_link, right.clone().unwrap())
                };
                DeleteOutcome {
                    removed: sub.removed,
                    ..outcome
                }
            } else {
                let sub = delete(right, key);
                let outcome = if !sub.underflow {
                    unchanged(Some(two(*k, v.clone(), left.clone(), sub.new_link)))
                } else {
                    fix_two_right(*k, v.clone(), left.clone().unwrap(), sub.new_link)
                };
                DeleteOutcome {
                    removed: sub.removed,
                    ..outcome
                }
            }
        }
        Node::Three {
            key1,
            value1,
            key2,
            value2,
            left,
            mid,
            right,
            ..
        } => {
            let (k1, v1, k2, v2) = (*key1, value1.clone(), *key2, value2.clone());
            if left.is_none() && mid.is_none() && right.is_none() {
                if key == k1 {
                    DeleteOutcome {
                        new_link: Some(two(k2, v2, None, None)),
                        underflow: false,
                        removed: Some(v1),
                    }
                } else if key == k2 {
                    DeleteOutcome {
                        new_link: Some(two(k1, v1, None, None)),
                        underflow: false,
                        removed: Some(v2),
                    }
                } else {
                    unchanged(Some(node.clone()))
                }
            } else if key == k1 {
                let (pk, pv) = tree_max(left.as_ref().unwrap());
                let sub = delete(left, pk);
                let outcome = if !sub.underflow {
                    unchanged(Some(three(
                        pk,
                        pv,
                        k2,
                        v2,
                        sub.new_link,
                        mid.clone(),
                        right.clone(),
                    )))
                } else {
                    fix_three_left(pk, pv, k2, v2, sub.new_link, mid.clone().unwrap(), right.clone())
                };
                DeleteOutcome {
                    removed: Some(v1),
                    ..outcome
                }
            } else if key == k2 {
                let (pk, pv) = tree_max(mid.as_ref().unwrap());
                let sub = delete(mid, pk);
                let outcome = if !sub.underflow {
                    unchanged(Some(three(
                        k1,
                        v1,
                        pk,
                        pv,
                        left.clone(),
                        sub.new_link,
                        right.clone(),
                    )))
                } else {
                    fix_three_mid(k1, v1, pk, pv, left.clone().unwrap(), sub.new_link, right.clone().unwrap())
                };
                DeleteOutcome {
                    removed: Some(v2),
                    ..outcome
                }
            } else if key < k1 {
                let sub = delete(left, key);
                let outcome = if !sub.underflow {
                    unchanged(Some(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        sub.new_link,
                        mid.clone(),
                        right.clone(),
                    )))
                } else {
                    fix_three_left(k1, v1, k2, v2, sub.new_link, mid.clone().unwrap(), right.clone())
                };
                DeleteOutcome {
                    removed: sub.removed,
                    ..outcome
                }
            } else if key < k2 {
                let sub = delete(mid, key);
                let outcome = if !sub.underflow {
                    unchanged(Some(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        left.clone(),
                        sub.new_link,
                        right.clone(),
                    )))
                } else {
                    fix_three_mid(k1, v1, k2, v2, left.clone().unwrap(), sub.new_link, right.clone().unwrap())
                };
                DeleteOutcome {
                    removed: sub.removed,
                    ..outcome
                }
            } else {
                let sub = delete(right, key);
                let outcome = if !sub.underflow {
                    unchanged(Some(three(
                        k1,
                        v1,
                        k2,
                        v2,
                        left.clone(),
                        mid.clone(),
                        sub.new_link,
                    )))
                } else {
                    fix_three_right(k1, v1, k2, v2, left.clone(), mid.clone().unwrap(), sub.new_link)
                };
                DeleteOutcome {
                    removed: sub.removed,
                    ..outcome
                }
            }
        }
    }
}

/// `parent` is a 2-node whose left child underflowed to `d_link`; `sibling`
/// is the parent's intact right child.
fn fix_two_left<V>(pk: i64, pv: Arc<V>, d_link: Link<V>, sibling: Arc<Node<V>>) -> DeleteOutcome<V> {
    match sibling.as_ref() {
        Node::Two {
            key: sk,
            value: sv,
            left: sl,
            right: sr,
            ..
        } => {
            let merged = three(pk, pv, *sk, sv.clone(), d_link, sl.clone(), sr.clone());
            DeleteOutcome {
                new_link: Some(merged),
                underflow: true,
                removed: None,
            }
        }
        Node::Three {
            key1: sk1,
            value1: sv1,
            key2: sk2,
            value2: sv2,
            left: sl,
            mid: sm,
            right: sr,
            ..
        } => {
            let new_left = two(pk, pv, d_link, sl.clone());
            let new_right = two(*sk2, sv2.clone(), sm.clone(), sr.clone());
            DeleteOutcome {
                new_link: Some(two(*sk1, sv1.clone(), Some(new_left), Some(new_right))),
                underflow: false,
                removed: None,
            }
        }
    }
}

/// `parent` is a 2-node whose right child underflowed to `d_link`; `sibling`
/// is the parent's intact left child.
fn fix_two_right<V>(pk: i64, pv: Arc<V>, sibling: Arc<Node<V>>, d_link: Link<V>) -> DeleteOutcome<V> {
    match sibling.as_ref() {
        Node::Two {
            key: sk,
            value: sv,
            left: sl,
            right: sr,
            ..
        } => {
            let merged = three(*sk, sv.clone(), pk, pv, sl.clone(), sr.clone(), d_link);
            DeleteOutcome {
                new_link: Some(merged),
                underflow: true,
                removed: None,
            }
        }
        Node::Three {
            key1: sk1,
            value1: sv1,
            key2: sk2,
            value2: sv2,
            left: sl,
            mid: sm,
            right: sr,
            ..
        } => {
            let new_left = two(*sk1, sv1.clone(), sl.clone(), sm.clone());
            let new_right = two(pk, pv, sr.clone(), d_link);
            DeleteOutcome {
                new_link: Some(two(*sk2, sv2.clone(), Some(new_left), Some(new_right))),
                underflow: false,
                removed: None,
            }
        }
    }
}

/// `parent` is a 3-node whose left child underflowed; `mid` is its adjacent
/// sibling, `right` the untouched far child.
fn fix_three_left<V>(
    pk1: i64,
    pv1: Arc<V>,
    pk2: i64,
    pv2: Arc<V>,
    d_link: Link<V>,
    mid: Arc<Node<V>>,
    right: Link<V>,
) -> DeleteOutcome<V> {
    match mid.as_ref() {
        Node::Two {
            key: mk,
            value: mv,
            left: ml,
            right: mr,
            ..
        } => {
            let merged = three(pk1, pv1, *mk, mv.clone(), d_link, ml.clone(), mr.clone());
            unchanged(Some(two(pk2, pv2, Some(merged), right)))
        }
        Node::Three {
            key1: mk1,
            value1: mv1,
            key2: mk2,
            value2: mv2,
            left: ml,
            mid: mm,
            right: mr,
            ..
        } => {
            let new_d = two(pk1, pv1, d_link, ml.clone());
            let new_mid = two(*mk2, mv2.clone(), mm.clone(), mr.clone());
            unchanged(Some(three(
                *mk1,
                mv1.clone(),
                pk2,
                pv2,
                Some(new_d),
                Some(new_mid),
                right,
            )))
        }
    }
}

/// `parent` is a 3-node whose right child underflowed; `mid` is its adjacent
/// sibling, `left` the untouched far child.
fn fix_three_right<V>(
    pk1: i64,
    pv1: Arc<V>,
    pk2: i64,
    pv2: Arc<V>,
    left: Link<V>,
    mid: Arc<Node<V>>,
    d_link: Link<V>,
) -> DeleteOutcome<V> {
    match mid.as_ref() {
        Node::Two {
            key: mk,
            value: mv,
            left: ml,
            right: mr,
            ..
        } => {
            let merged = three(*mk, mv.clone(), pk2, pv2, ml.clone(), mr.clone(), d_link);
            unchanged(Some(two(pk1, pv1, left, Some(merged))))
        }
        Node::Three {
            key1: mk1,
            value1: mv1,
            key2: mk2,
            value2: mv2,
            left: ml,
            mid: mm,
            right: mr,
            ..
        } => {
            let new_mid = two(*mk1, mv1.clone(), ml.clone(), mm.clone());
            let new_d = two(pk2, pv2, mr.clone(), d_link);
            unchanged(Some(three(
                pk1,
                pv1,
                *mk2,
                mv2.clone(),
                left,
                Some(new_mid),
                Some(new_d),
            )))
        }
    }
}

/// `parent` is a 3-node whose middle child underflowed to `d_link`; `left`
/// and `right` are its two untouched outer children.
fn fix_three_mid<V>(
    pk1: i64,
    pv1: Arc<V>,
    pk2: i64,
    pv2: Arc<V>,
    left: Arc<Node<V>>,
    d_link: Link<V>,
    right: Arc<Node<V>>,
) -> DeleteOutcome<V> {
    if let Node::Three {
        key1: lk1,
        value1: lv1,
        key2: lk2,
        value2: lv2,
        left: ll,
        mid: lm,
        right: lr,
        ..
    } = left.as_ref()
    {
        let new_left = two(*lk1, lv1.clone(), ll.clone(), lm.clone());
        let new_mid = two(pk1, pv1, lr.clone(), d_link);
        return unchanged(Some(three(
            *lk2,
            lv2.clone(),
            pk2,
            pv2,
            Some(new_left),
            Some(new_mid),
            Some(right),
        )));
    }
    if let Node::Three {
        key1: rk1,
        value1: rv1,
        key2: rk2,
        value2: rv2,
        left: rl,
        mid: rm,
        right: rr,
        ..
    } = right.as_ref()
    {
        let new_mid = two(pk2, pv2, d_link, rl.clone());
        let new_right = two(*rk2, rv2.clone(), rm.clone(), rr.clone());
        return unchanged(Some(three(
            pk1,
            pv1,
            *rk1,
            rv1.clone(),
            Some(left),
            Some(new_mid),
            Some(new_right),
        )));
    }
    if let Node::Two {
        key: lk,
        value: lv,
        left: ll,
        right: lr,
        ..
    } = left.as_ref()
    {
        let merged = three(*lk, lv.clone(), pk1, pv1, ll.clone(), lr.clone(), d_link);
        return unchanged(Some(two(pk2, pv2, Some(merged), Some(right))));
    }
    unreachable!("a 3-node parent always has at least one mergeable adjacent sibling")
}
