// motion-core/src/pool.rs
// Ring pool of planning blocks.
//
// Blocks sit in a circular list with fixed prev/next index links and three
// cursors: write (next empty slot to hand out), queue (next loading slot to
// commit), and run (current or next running slot). The planner only touches
// slots behind the run cursor; the executor only touches the slot at run.
// That separation is what lets a foreground planner and an interrupt-context
// executor share the pool without locking.

use crate::block::{Block, BufferState, MoveState, MoveType};

pub struct BlockPool {
    blocks: Vec<Block>,
    write: usize,
    queue: usize,
    run: usize,
    available: usize,
}

impl BlockPool {
    /// Build a pool of `size` empty blocks linked in a ring. Allocates once;
    /// nothing on the queueing or execution paths allocates after this.
    pub fn new(size: usize) -> Self {
        assert!(size >= 2, "block pool needs at least 2 slots");
        let mut blocks = Vec::with_capacity(size);
        for i in 0..size {
            let prev = if i == 0 { size - 1 } else { i - 1 };
            let next = if i == size - 1 { 0 } else { i + 1 };
            blocks.push(Block::new(prev, next));
        }
        BlockPool {
            blocks,
            write: 0,
            queue: 0,
            run: 0,
            available: size,
        }
    }

    /// Empty every slot and reset the cursors. Links are preserved.
    pub fn reset(&mut self) {
        for b in self.blocks.iter_mut() {
            b.clear();
        }
        self.write = 0;
        self.queue = 0;
        self.run = 0;
        self.available = self.blocks.len();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available == self.blocks.len()
    }

    /// Count of empty slots. Zero is the backpressure signal to the G-code
    /// producer above.
    pub fn available(&self) -> usize {
        self.available
    }

    #[inline]
    pub fn block(&self, idx: usize) -> &Block {
        &self.blocks[idx]
    }

    #[inline]
    pub fn block_mut(&mut self, idx: usize) -> &mut Block {
        &mut self.blocks[idx]
    }

    #[inline]
    pub fn next_of(&self, idx: usize) -> usize {
        self.blocks[idx].next
    }

    #[inline]
    pub fn prev_of(&self, idx: usize) -> usize {
        self.blocks[idx].prev
    }

    /// Hand out the slot at the write cursor if it is empty. The slot is
    /// cleared, marked Loading, and the cursor advances. Returns None when
    /// the ring is full.
    pub fn acquire_write(&mut self) -> Option<usize> {
        let w = self.write;
        if self.blocks[w].state != BufferState::Empty {
            return None;
        }
        self.blocks[w].clear();
        self.blocks[w].state = BufferState::Loading;
        self.available -= 1;
        self.write = self.blocks[w].next;
        Some(w)
    }

    /// Commit the oldest loading slot to the queue. The queue cursor trails
    /// the write cursor, so out-of-order commits are impossible.
    pub fn commit_write(&mut self, move_type: MoveType) {
        let q = self.queue;
        debug_assert_eq!(self.blocks[q].state, BufferState::Loading);
        self.blocks[q].move_type = move_type;
        self.blocks[q].move_state = MoveState::New;
        self.blocks[q].state = BufferState::Queued;
        self.queue = self.blocks[q].next;
    }

    /// Latch the slot at the run cursor as Running and return it. Calling
    /// again before free_run() returns the same slot, which is what lets
    /// move continuations re-enter. Returns None when nothing is queued.
    pub fn acquire_run(&mut self) -> Option<usize> {
        let r = self.run;
        if matches!(
            self.blocks[r].state,
            BufferState::Queued | BufferState::Pending
        ) {
            self.blocks[r].state = BufferState::Running;
        }
        if self.blocks[r].state == BufferState::Running {
            return Some(r);
        }
        None
    }

    /// Non-promoting view of the head of the queue.
    pub fn first(&self) -> Option<usize> {
        let r = self.run;
        if matches!(
            self.blocks[r].state,
            BufferState::Queued | BufferState::Pending | BufferState::Running
        ) {
            return Some(r);
        }
        None
    }

    /// Walk forward from the run slot to the last block with work left.
    /// O(n); used only during replans.
    pub fn last(&self) -> Option<usize> {
        let first = self.first()?;
        let mut bp = first;
        loop {
            let nx = self.blocks[bp].next;
            if self.blocks[nx].move_state == MoveState::Off || nx == first {
                return Some(bp);
            }
            bp = nx;
            if bp == first {
                return Some(bp);
            }
        }
    }

    /// Release the run slot back to the pool and advance the run cursor,
    /// promoting the new head from Queued to Pending if present. Returns
    /// true when the queue is now empty (run caught up with write).
    pub fn free_run(&mut self) -> bool {
        let r = self.run;
        self.blocks[r].clear();
        self.run = self.blocks[r].next;
        if self.blocks[self.run].state == BufferState::Queued {
            self.blocks[self.run].state = BufferState::Pending;
        }
        self.available += 1;
        self.write == self.run
    }

    /// Overwrite dst with src's contents, keeping dst's ring links.
    pub fn copy_block(&mut self, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        let src_block = self.blocks[src].clone();
        self.blocks[dst].copy_from(&src_block);
    }
}
