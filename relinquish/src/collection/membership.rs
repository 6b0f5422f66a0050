//! Insertion-ordered membership with constant-time removal.
//!
//! Members are kept in a doubly linked list threaded through a hash map, so
//! lookup by identity, unlinking, insertion at the head and popping the
//! head are all O(1). New members go to the head, which makes draining from
//! the head last-in, first-out.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ReleaseError, ReleaseResult};
use crate::types::ListenerId;

/// Identity of a member: the address of its shared allocation.
pub(crate) type MemberKey = usize;

/// Derives the identity key for a shared resource.
pub(crate) fn key_of<T: ?Sized>(resource: &Arc<T>) -> MemberKey {
    Arc::as_ptr(resource).cast::<()>() as usize
}

#[derive(Debug)]
pub(crate) struct Node<M> {
    pub(crate) member: M,
    pub(crate) listener: Option<ListenerId>,
    prev: Option<MemberKey>,
    next: Option<MemberKey>,
}

#[derive(Debug)]
pub(crate) struct Membership<M> {
    head: Option<MemberKey>,
    tail: Option<MemberKey>,
    nodes: HashMap<MemberKey, Node<M>>,
}

impl<M> Default for Membership<M> {
    fn default() -> Self {
        Self {
            head: None,
            tail: None,
            nodes: HashMap::new(),
        }
    }
}

impl<M> Membership<M> {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn contains(&self, key: MemberKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Inserts at the head. Fails if `key` is already a member.
    pub(crate) fn push_front(
        &mut self,
        key: MemberKey,
        member: M,
        listener: Option<ListenerId>,
    ) -> ReleaseResult<()> {
        if self.nodes.contains_key(&key) {
            return Err(ReleaseError::InvalidArgument {
                name: "resource",
                reason: "already a member of this collection".to_string(),
            });
        }
        let old_head = self.head;
        if let Some(old) = old_head {
            self.node_mut(old)?.prev = Some(key);
        } else {
            self.tail = Some(key);
        }
        self.nodes.insert(
            key,
            Node {
                member,
                listener,
                prev: None,
                next: old_head,
            },
        );
        self.head = Some(key);
        Ok(())
    }

    /// Unlinks and returns the node for `key`, or `None` if it is not a member.
    pub(crate) fn remove(&mut self, key: MemberKey) -> ReleaseResult<Option<Node<M>>> {
        let Some(node) = self.nodes.get(&key) else {
            return Ok(None);
        };
        let (prev, next) = (node.prev, node.next);

        match prev {
            Some(p) => {
                let prev_node = self.node_mut(p)?;
                if prev_node.next != Some(key) {
                    return Err(inconsistent("predecessor does not link back to member"));
                }
                prev_node.next = next;
            }
            None if self.head == Some(key) => self.head = next,
            None => return Err(inconsistent("member without predecessor is not the head")),
        }
        match next {
            Some(n) => {
                let next_node = self.node_mut(n)?;
                if next_node.prev != Some(key) {
                    return Err(inconsistent("successor does not link back to member"));
                }
                next_node.prev = prev;
            }
            None if self.tail == Some(key) => self.tail = prev,
            None => return Err(inconsistent("member without successor is not the tail")),
        }

        Ok(self.nodes.remove(&key))
    }

    /// Unlinks and returns the most recently added member.
    pub(crate) fn pop_front(&mut self) -> ReleaseResult<Option<Node<M>>> {
        match self.head {
            Some(key) => match self.remove(key)? {
                Some(node) => Ok(Some(node)),
                None => Err(inconsistent("head has no lookup entry")),
            },
            None if self.nodes.is_empty() => Ok(None),
            None => Err(inconsistent("lookup entries without an ordered head")),
        }
    }

    /// Unlinks every member, most recently added first.
    pub(crate) fn drain(&mut self) -> ReleaseResult<Vec<Node<M>>> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(node) = self.pop_front()? {
            drained.push(node);
        }
        Ok(drained)
    }

    /// Members in drain order.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &M> + '_ {
        std::iter::successors(self.head.and_then(|k| self.nodes.get(&k)), |node| {
            node.next.and_then(|k| self.nodes.get(&k))
        })
        .map(|node| &node.member)
    }

    fn node_mut(&mut self, key: MemberKey) -> ReleaseResult<&mut Node<M>> {
        self.nodes
            .get_mut(&key)
            .ok_or_else(|| inconsistent("linked member has no lookup entry"))
    }
}

fn inconsistent(detail: &str) -> ReleaseError {
    ReleaseError::Inconsistent(detail.to_string())
}
