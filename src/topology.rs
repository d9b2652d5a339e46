//! Execution topology and the barriers indexed by it.
//!
//! Units are nested thread within block, block within die, die within chip.
//! The die axis is optional; a topology without one behaves as if every chip
//! held a single die.
use crate::error::TopologyError;
use hyperdrive::sync::barrier::Barrier;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// An axis of the topology, from innermost to outermost.
///
/// Used as a barrier level too: synchronizing at `level` rendezvouses every
/// unit that shares all coordinates above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum Axis {
    Thread = 0,
    Block = 1,
    Die = 2,
    Chip = 3,
}

impl Axis {
    pub const ALL: [Self; 4] = [Self::Thread, Self::Block, Self::Die, Self::Chip];
}

impl core::fmt::Display for Axis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Thread => "thread",
            Self::Block => "block",
            Self::Die => "die",
            Self::Chip => "chip",
        };
        f.write_str(name)
    }
}

/// Position of one unit in the topology.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadCoords {
    pub thread: u32,
    pub block: u32,
    pub die: u32,
    pub chip: u32,
}

impl ThreadCoords {
    #[must_use]
    #[inline]
    pub const fn new(thread: u32, block: u32, die: u32, chip: u32) -> Self {
        Self {
            thread,
            block,
            die,
            chip,
        }
    }

    #[must_use]
    #[inline]
    pub const fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Thread => self.thread,
            Axis::Block => self.block,
            Axis::Die => self.die,
            Axis::Chip => self.chip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    threads: u32,
    blocks: u32,
    dies: Option<u32>,
    chips: u32,
}

impl Topology {
    /// Creates a topology without a die axis.
    ///
    /// # Errors
    ///
    /// Returns `EmptyAxis` if a dimension is zero, or `TooLarge` if the unit
    /// count does not fit in `usize`.
    pub fn new(threads: u32, blocks: u32, chips: u32) -> Result<Self, TopologyError> {
        let topology = Self {
            threads,
            blocks,
            dies: None,
            chips,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Adds a die axis of `dies` dies per chip.
    ///
    /// # Errors
    ///
    /// See [`Topology::new`].
    pub fn with_dies(self, dies: u32) -> Result<Self, TopologyError> {
        let topology = Self {
            dies: Some(dies),
            ..self
        };
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<(), TopologyError> {
        for axis in Axis::ALL {
            if self.dimension(axis) == 0 {
                return Err(TopologyError::EmptyAxis { axis });
            }
        }
        Axis::ALL
            .iter()
            .try_fold(1usize, |acc, axis| {
                acc.checked_mul(usize::try_from(self.dimension(*axis)).ok()?)
            })
            .ok_or(TopologyError::TooLarge)?;
        Ok(())
    }

    #[must_use]
    #[inline]
    pub const fn has_dies(&self) -> bool {
        self.dies.is_some()
    }

    #[must_use]
    #[inline]
    /// Size of `axis`; a missing die axis has size 1.
    pub const fn dimension(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Thread => self.threads,
            Axis::Block => self.blocks,
            Axis::Die => match self.dies {
                Some(dies) => dies,
                None => 1,
            },
            Axis::Chip => self.chips,
        }
    }

    #[must_use]
    /// Number of units sharing one group at `level`: the product of the
    /// dimensions from `level` down to threads.
    pub fn group_size(&self, level: Axis) -> usize {
        Axis::ALL
            .iter()
            .take_while(|axis| **axis as u32 <= level as u32)
            .map(|axis| self.dimension(*axis) as usize)
            .product()
    }

    #[must_use]
    #[inline]
    pub fn unit_count(&self) -> usize {
        self.group_size(Axis::Chip)
    }

    /// Checks that `coords` lie inside the topology.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` naming the first offending axis.
    pub fn check(&self, coords: ThreadCoords) -> Result<(), TopologyError> {
        for axis in Axis::ALL {
            let value = coords.get(axis);
            let dimension = self.dimension(axis);
            if value >= dimension {
                return Err(TopologyError::OutOfRange {
                    axis,
                    value,
                    dimension,
                });
            }
        }
        Ok(())
    }

    /// Linear index of `coords`, with threads varying fastest.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for coordinates outside the topology.
    pub fn linear_index(&self, coords: ThreadCoords) -> Result<usize, TopologyError> {
        self.check(coords)?;
        Ok(Axis::ALL.iter().rev().fold(0, |acc, axis| {
            acc * self.dimension(*axis) as usize + coords.get(*axis) as usize
        }))
    }

    /// Every unit of the topology, in linear index order.
    pub fn units(&self) -> impl Iterator<Item = ThreadCoords> + '_ {
        (0..self.chips).flat_map(move |chip| {
            (0..self.dimension(Axis::Die)).flat_map(move |die| {
                (0..self.blocks).flat_map(move |block| {
                    (0..self.threads).map(move |thread| ThreadCoords::new(thread, block, die, chip))
                })
            })
        })
    }
}

/// One barrier per synchronization group and level.
#[derive(Debug)]
pub struct BarrierSet {
    topology: Topology,
    /// Indexed by (chip, die, block)
    thread: Box<[Barrier]>,
    /// Indexed by (chip, die)
    block: Box<[Barrier]>,
    /// Indexed by chip, empty without a die axis
    die: Box<[Barrier]>,
    chip: Barrier,
}

impl BarrierSet {
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        let groups = |level: Axis| topology.unit_count() / topology.group_size(level);
        let barriers = |level: Axis| {
            (0..groups(level))
                .map(|_| Barrier::new(topology.group_size(level)))
                .collect::<Box<[_]>>()
        };

        Self {
            topology,
            thread: barriers(Axis::Thread),
            block: barriers(Axis::Block),
            die: if topology.has_dies() {
                barriers(Axis::Die)
            } else {
                Box::default()
            },
            chip: Barrier::new(topology.unit_count()),
        }
    }

    #[must_use]
    #[inline]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Clears every barrier, including poisoned ones.
    pub fn reset(&mut self) {
        self.thread
            .iter_mut()
            .chain(self.block.iter_mut())
            .chain(self.die.iter_mut())
            .chain(core::iter::once(&mut self.chip))
            .for_each(Barrier::reset);
    }

    /// The barrier `coords` rendezvous on at `level`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for coordinates outside the topology, or
    /// `NoDieAxis` for a die-level barrier in a topology without dies.
    pub fn get(&self, level: Axis, coords: ThreadCoords) -> Result<&Barrier, TopologyError> {
        let index = self.topology.linear_index(coords)?;
        let group = index / self.topology.group_size(level);
        let barrier = match level {
            Axis::Thread => &self.thread[group],
            Axis::Block => &self.block[group],
            Axis::Die => self.die.get(group).ok_or(TopologyError::NoDieAxis)?,
            Axis::Chip => &self.chip,
        };
        Ok(barrier)
    }
}
