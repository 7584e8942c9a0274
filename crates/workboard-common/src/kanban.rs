//! Kanban column ordering.
//!
//! Cards carry a sparse integer `position`. After a drag, the moved card is
//! placed at `min((index + 1) * POSITION_STEP, MAX_POSITION)` and every
//! displaced card in the touched columns is renumbered with the same formula.
//! Only cards whose position (or status) actually changes produce a
//! [`PositionUpdate`], so the result can be sent straight to a bulk update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskStatus;

/// Gap between neighbouring positions.
pub const POSITION_STEP: i64 = 1000;

/// Positions never exceed this value; cards past the 100th slot share it.
pub const MAX_POSITION: i64 = 100_000;

/// Position assigned to the card at `index` in a column.
pub fn position_for_index(index: usize) -> i64 {
    let slot = i64::try_from(index).unwrap_or(i64::MAX).saturating_add(1);
    slot.saturating_mul(POSITION_STEP).min(MAX_POSITION)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub status: TaskStatus,
    pub position: i64,
}

/// One changed task emitted by a reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: i64,
    pub status: TaskStatus,
    pub position: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("No card at index {index} in column {status} (column holds {len})")]
    SourceOutOfRange {
        status: TaskStatus,
        index: usize,
        len: usize,
    },

    #[error("Card {id} is not on the board")]
    CardNotFound { id: i64 },
}

/// In-memory board: one position-sorted column per status.
#[derive(Debug, Clone)]
pub struct Board {
    columns: BTreeMap<TaskStatus, Vec<Card>>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            columns: TaskStatus::ALL.iter().map(|s| (*s, Vec::new())).collect(),
        }
    }
}

impl Board {
    /// Group cards by status and sort each column by position (ties by id).
    pub fn from_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut board = Self::default();
        for card in cards {
            board.columns.entry(card.status).or_default().push(card);
        }
        for column in board.columns.values_mut() {
            column.sort_by_key(|c| (c.position, c.id));
        }
        board
    }

    pub fn column(&self, status: TaskStatus) -> &[Card] {
        self.columns.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Columns in board order.
    pub fn columns(&self) -> impl Iterator<Item = (TaskStatus, &[Card])> {
        self.columns.iter().map(|(s, c)| (*s, c.as_slice()))
    }

    pub fn locate(&self, id: i64) -> Option<(TaskStatus, usize)> {
        self.columns.iter().find_map(|(status, column)| {
            column
                .iter()
                .position(|c| c.id == id)
                .map(|index| (*status, index))
        })
    }

    /// Move the card at `source_index` of `source` to `dest_index` of `dest`.
    ///
    /// `dest_index` is clamped to the destination length. The moved card's
    /// update is always first, followed by changed destination neighbours and,
    /// for cross-column moves, changed source cards.
    pub fn move_card(
        &mut self,
        source: TaskStatus,
        source_index: usize,
        dest: TaskStatus,
        dest_index: usize,
    ) -> Result<Vec<PositionUpdate>, ReorderError> {
        let source_column = self.columns.entry(source).or_default();
        if source_index >= source_column.len() {
            return Err(ReorderError::SourceOutOfRange {
                status: source,
                index: source_index,
                len: source_column.len(),
            });
        }
        let mut moved = source_column.remove(source_index);
        moved.status = dest;
        let moved_id = moved.id;

        let dest_column = self.columns.entry(dest).or_default();
        let insert_at = dest_index.min(dest_column.len());
        dest_column.insert(insert_at, moved);

        let moved_position = position_for_index(insert_at);
        dest_column[insert_at].position = moved_position;

        let mut updates = vec![PositionUpdate {
            id: moved_id,
            status: dest,
            position: moved_position,
        }];
        updates.extend(renumber(dest_column, dest, Some(moved_id)));

        if source != dest {
            let source_column = self.columns.entry(source).or_default();
            updates.extend(renumber(source_column, source, None));
        }

        Ok(updates)
    }

    /// Same as [`Board::move_card`], addressing the card by id.
    pub fn move_card_by_id(
        &mut self,
        id: i64,
        dest: TaskStatus,
        dest_index: usize,
    ) -> Result<Vec<PositionUpdate>, ReorderError> {
        let (source, source_index) = self.locate(id).ok_or(ReorderError::CardNotFound { id })?;
        self.move_card(source, source_index, dest, dest_index)
    }
}

fn renumber(column: &mut [Card], status: TaskStatus, skip: Option<i64>) -> Vec<PositionUpdate> {
    column
        .iter_mut()
        .enumerate()
        .filter(|(_, card)| Some(card.id) != skip)
        .filter_map(|(index, card)| {
            let position = position_for_index(index);
            if card.position == position {
                return None;
            }
            card.position = position;
            Some(PositionUpdate {
                id: card.id,
                status,
                position,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: i64, status: TaskStatus, position: i64) -> Card {
        Card {
            id,
            status,
            position,
        }
    }

    fn update(id: i64, status: TaskStatus, position: i64) -> PositionUpdate {
        PositionUpdate {
            id,
            status,
            position,
        }
    }

    #[test]
    fn test_position_for_index_is_spaced_and_capped() {
        assert_eq!(position_for_index(0), 1000);
        assert_eq!(position_for_index(4), 5000);
        assert_eq!(position_for_index(99), 100_000);
        assert_eq!(position_for_index(250), 100_000);
        assert_eq!(position_for_index(usize::MAX), MAX_POSITION);
    }

    #[test]
    fn test_from_cards_sorts_columns_by_position() {
        let board = Board::from_cards(vec![
            card(1, TaskStatus::Todo, 3000),
            card(2, TaskStatus::Todo, 1000),
            card(3, TaskStatus::Done, 1000),
        ]);
        let todo: Vec<i64> = board.column(TaskStatus::Todo).iter().map(|c| c.id).collect();
        assert_eq!(todo, vec![2, 1]);
        assert_eq!(board.column(TaskStatus::Done).len(), 1);
        assert!(board.column(TaskStatus::Backlog).is_empty());
        assert_eq!(board.columns().count(), 5);
    }

    #[test]
    fn test_move_within_column_renumbers_neighbours() {
        let mut board = Board::from_cards(vec![
            card(1, TaskStatus::Todo, 1000),
            card(2, TaskStatus::Todo, 2000),
            card(3, TaskStatus::Todo, 3000),
        ]);

        let updates = board
            .move_card(TaskStatus::Todo, 0, TaskStatus::Todo, 2)
            .unwrap();

        assert_eq!(
            updates,
            vec![
                update(1, TaskStatus::Todo, 3000),
                update(2, TaskStatus::Todo, 1000),
                update(3, TaskStatus::Todo, 2000),
            ]
        );
        let order: Vec<i64> = board.column(TaskStatus::Todo).iter().map(|c| c.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_move_across_columns_renumbers_both_sides() {
        let mut board = Board::from_cards(vec![
            card(1, TaskStatus::Todo, 1000),
            card(2, TaskStatus::Todo, 2000),
            card(3, TaskStatus::Done, 1000),
        ]);

        let updates = board
            .move_card(TaskStatus::Todo, 0, TaskStatus::Done, 0)
            .unwrap();

        assert_eq!(
            updates,
            vec![
                update(1, TaskStatus::Done, 1000),
                update(3, TaskStatus::Done, 2000),
                update(2, TaskStatus::Todo, 1000),
            ]
        );
        assert_eq!(board.locate(1), Some((TaskStatus::Done, 0)));
        assert_eq!(board.column(TaskStatus::Done)[0].status, TaskStatus::Done);
    }

    #[test]
    fn test_unchanged_cards_emit_nothing() {
        let mut board = Board::from_cards(vec![
            card(1, TaskStatus::Todo, 1000),
            card(2, TaskStatus::Todo, 2000),
        ]);

        let updates = board
            .move_card(TaskStatus::Todo, 1, TaskStatus::Todo, 1)
            .unwrap();

        assert_eq!(updates, vec![update(2, TaskStatus::Todo, 2000)]);
    }

    #[test]
    fn test_dest_index_is_clamped() {
        let mut board = Board::from_cards(vec![
            card(1, TaskStatus::Backlog, 1000),
            card(2, TaskStatus::Done, 1000),
        ]);

        let updates = board
            .move_card(TaskStatus::Backlog, 0, TaskStatus::Done, 40)
            .unwrap();

        assert_eq!(updates, vec![update(1, TaskStatus::Done, 2000)]);
        assert_eq!(board.locate(1), Some((TaskStatus::Done, 1)));
    }

    #[test]
    fn test_source_out_of_range_is_rejected() {
        let mut board = Board::from_cards(vec![card(1, TaskStatus::Todo, 1000)]);
        let err = board
            .move_card(TaskStatus::Todo, 3, TaskStatus::Done, 0)
            .unwrap_err();
        assert_eq!(
            err,
            ReorderError::SourceOutOfRange {
                status: TaskStatus::Todo,
                index: 3,
                len: 1
            }
        );
        // Board untouched
        assert_eq!(board.column(TaskStatus::Todo).len(), 1);
    }

    #[test]
    fn test_move_by_id_unknown_card() {
        let mut board = Board::default();
        let err = board.move_card_by_id(9, TaskStatus::Done, 0).unwrap_err();
        assert_eq!(err, ReorderError::CardNotFound { id: 9 });
    }

    #[test]
    fn test_positions_cap_at_max() {
        let cards: Vec<Card> = (0..105)
            .map(|i| card(i + 1, TaskStatus::Todo, position_for_index(i as usize)))
            .collect();
        let mut board = Board::from_cards(cards);

        let updates = board
            .move_card_by_id(1, TaskStatus::Todo, 104)
            .unwrap();

        assert_eq!(updates[0], update(1, TaskStatus::Todo, MAX_POSITION));
        assert!(updates.iter().all(|u| u.position <= MAX_POSITION));
        // Cards 2..=100 shift down one slot; cards beyond slot 100 stay capped.
        assert!(updates.iter().any(|u| u.id == 2 && u.position == 1000));
        assert!(!updates.iter().any(|u| u.id == 105));
    }
}
