use std::sync::atomic::{AtomicI8, Ordering};
use volseg_core::{Label, Point, Shape};

/// Shared claim cells, one per voxel.
///
/// Replicas may lag behind each other, so two workers can both see a voxel
/// as unvisited. Only the worker whose compare-and-set moves the cell from
/// `Unvisited` to `Member` proceeds; the loser skips the voxel.
#[derive(Debug)]
pub struct ClaimArbiter {
    shape: Shape,
    cells: Vec<AtomicI8>,
}

impl ClaimArbiter {
    pub fn new(shape: Shape) -> Self {
        let cells = (0..shape.len())
            .map(|_| AtomicI8::new(Label::Unvisited.code()))
            .collect();
        Self { shape, cells }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Claim `p` for the current cluster. On failure returns the label that
    /// was already recorded.
    pub fn try_claim(&self, p: Point) -> Result<(), Label> {
        self.cells[self.shape.offset(p)]
            .compare_exchange(
                Label::Unvisited.code(),
                Label::Member.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(decode)
    }

    /// Unconditional write, used by the orchestrator for noise and discards.
    pub fn store(&self, p: Point, label: Label) {
        self.cells[self.shape.offset(p)].store(label.code(), Ordering::Release);
    }

    pub fn get(&self, p: Point) -> Label {
        decode(self.cells[self.shape.offset(p)].load(Ordering::Acquire))
    }
}

// Cells only ever hold codes written by this type.
fn decode(code: i8) -> Label {
    Label::from_code(code).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claim_once() {
        let arbiter = ClaimArbiter::new(Shape::new(2, 2, 2));
        let p = Point::new(1, 0, 1);
        assert_eq!(arbiter.try_claim(p), Ok(()));
        assert_eq!(arbiter.try_claim(p), Err(Label::Member));
        assert_eq!(arbiter.get(p), Label::Member);
    }

    #[test]
    fn test_noise_cannot_be_claimed() {
        let arbiter = ClaimArbiter::new(Shape::new(1, 1, 2));
        let p = Point::new(0, 0, 1);
        arbiter.store(p, Label::Noise);
        assert_eq!(arbiter.try_claim(p), Err(Label::Noise));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let shape = Shape::new(4, 4, 4);
        let arbiter = Arc::new(ClaimArbiter::new(shape));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arbiter = arbiter.clone();
                let wins = wins.clone();
                thread::spawn(move || {
                    for p in shape.points() {
                        if arbiter.try_claim(p).is_ok() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), shape.len());
    }
}
