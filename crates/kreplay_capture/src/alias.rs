//! Buffer aliasing resolution.
//!
//! Buffer arguments whose recorded identity tokens are byte-equal shared one
//! allocation at capture time. Replay creates one allocation per group and
//! binds it at every member position.

use indexmap::IndexMap;
use kreplay_core::{ArgumentKind, ArgumentTable, Notice, NoticeLog, Position};
use serde::{Deserialize, Serialize};

/// Buffer positions sharing one allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasGroup {
    /// Member positions, ascending
    pub positions: Vec<Position>,
}

impl AliasGroup {
    /// The lowest position; its pre-state initializes the allocation
    #[must_use]
    pub fn representative(&self) -> Position {
        self.positions[0]
    }

    /// Whether the group has more than one member
    #[must_use]
    pub fn is_aliased(&self) -> bool {
        self.positions.len() > 1
    }
}

/// SVM positions sharing one allocation, each at its own offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvmGroup {
    /// `(position, offset)` pairs, ascending by position
    pub members: Vec<(Position, u64)>,
}

impl SvmGroup {
    /// The lowest position; its pre-state initializes the region
    #[must_use]
    pub fn representative(&self) -> Position {
        self.members[0].0
    }

    /// Member positions
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.members.iter().map(|(pos, _)| *pos)
    }
}

/// Allocation plan for every buffer-like argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasPlan {
    /// Device buffer groups in first-seen order
    pub buffer_groups: Vec<AliasGroup>,
    /// SVM groups in first-seen order
    pub svm_groups: Vec<SvmGroup>,
    /// One [`Notice::AliasGroup`] per group with more than one member
    pub notices: NoticeLog,
}

impl AliasPlan {
    /// Partition the buffer and SVM arguments of `table` by identity token.
    ///
    /// Arguments without a recorded token never alias anything.
    #[must_use]
    pub fn resolve(table: &ArgumentTable) -> Self {
        let mut buffers: IndexMap<Vec<u8>, Vec<Position>> = IndexMap::new();
        let mut svm: IndexMap<Vec<u8>, Vec<(Position, u64)>> = IndexMap::new();
        let mut plan = Self::default();

        for (position, kind) in table.iter() {
            match kind {
                ArgumentKind::Buffer { identity, .. } => match identity {
                    Some(token) => buffers.entry(token.clone()).or_default().push(position),
                    None => plan.buffer_groups.push(AliasGroup {
                        positions: vec![position],
                    }),
                },
                ArgumentKind::Svm {
                    identity, offset, ..
                } => match identity {
                    Some(token) => svm
                        .entry(token.clone())
                        .or_default()
                        .push((position, *offset)),
                    None => plan.svm_groups.push(SvmGroup {
                        members: vec![(position, *offset)],
                    }),
                },
                _ => {}
            }
        }

        plan.buffer_groups.extend(
            buffers
                .into_values()
                .map(|positions| AliasGroup { positions }),
        );
        plan.svm_groups
            .extend(svm.into_values().map(|members| SvmGroup { members }));
        plan.buffer_groups.sort_by_key(AliasGroup::representative);
        plan.svm_groups.sort_by_key(SvmGroup::representative);

        for group in &plan.buffer_groups {
            if group.is_aliased() {
                tracing::info!(positions = ?group.positions, "Aliased buffer arguments");
                plan.notices.push(Notice::AliasGroup {
                    positions: group.positions.clone(),
                });
            }
        }
        for group in &plan.svm_groups {
            if group.members.len() > 1 {
                let positions: Vec<Position> = group.positions().collect();
                tracing::info!(?positions, "Arguments share one SVM allocation");
                plan.notices.push(Notice::AliasGroup { positions });
            }
        }

        plan
    }

    /// Number of allocations the plan creates
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.buffer_groups.len() + self.svm_groups.len()
    }
}
