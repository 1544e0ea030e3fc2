/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Application side of a task: process image plus control logic.
//!
//! [`ControlTask`] adapts a [`ProcessImage`] and a control function into a
//! [`Runnable`]:
//!
//! ```text
//! bind        → image.init()
//! cycle_init  → logic.init(outputs)
//! cycle       → image.read(inputs) → logic.step(inputs, outputs) → image.write(outputs)
//! unbind      → image.deinit()
//! ```

use anyhow::Result;
use tracing::debug;

use crate::task::Runnable;

/// Marshals a task's input and output variables.
pub trait ProcessImage: Send + 'static {
    type Inputs: Default + Send + 'static;
    type Outputs: Default + Send + 'static;

    /// Bind the image.  Called once before the task thread is spawned.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, inputs: &mut Self::Inputs);

    fn write(&mut self, outputs: &Self::Outputs);

    fn deinit(&mut self) {}
}

/// Per-cycle business logic: current inputs → new outputs.
pub trait ControlLogic<I, O>: Send + 'static {
    /// Called once on the task thread before the first cycle.
    fn init(&mut self, _outputs: &mut O) {}

    fn step(&mut self, inputs: &I, outputs: &mut O);
}

impl<I, O, F> ControlLogic<I, O> for F
where
    F: FnMut(&I, &mut O) + Send + 'static,
{
    fn step(&mut self, inputs: &I, outputs: &mut O) {
        self(inputs, outputs)
    }
}

/// [`Runnable`] that drives one control loop on a process image.
pub struct ControlTask<P: ProcessImage, L> {
    image: P,
    logic: L,
    inputs: P::Inputs,
    outputs: P::Outputs,
    cycles: u64,
}

impl<P, L> ControlTask<P, L>
where
    P: ProcessImage,
    L: ControlLogic<P::Inputs, P::Outputs>,
{
    pub fn new(image: P, logic: L) -> Self {
        Self {
            image,
            logic,
            inputs: P::Inputs::default(),
            outputs: P::Outputs::default(),
            cycles: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl<P, L> Runnable for ControlTask<P, L>
where
    P: ProcessImage,
    L: ControlLogic<P::Inputs, P::Outputs>,
{
    fn bind(&mut self) -> Result<()> {
        self.image.init()
    }

    fn cycle_init(&mut self) {
        self.logic.init(&mut self.outputs);
        self.image.write(&self.outputs);
        debug!("Control task initialised");
    }

    fn cycle(&mut self) {
        self.image.read(&mut self.inputs);
        self.logic.step(&self.inputs, &mut self.outputs);
        self.image.write(&self.outputs);
        self.cycles = self.cycles.wrapping_add(1);
    }

    fn unbind(&mut self) {
        self.image.deinit();
        debug!(cycles = self.cycles, "Control task unbound");
    }
}

// ── LoopbackImage ─────────────────────────────────────────────────────────────

/// In-memory image whose inputs are the outputs of the previous cycle.
#[derive(Debug, Default)]
pub struct LoopbackImage {
    value: u64,
    bound: bool,
}

impl LoopbackImage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessImage for LoopbackImage {
    type Inputs = u64;
    type Outputs = u64;

    fn init(&mut self) -> Result<()> {
        self.bound = true;
        Ok(())
    }

    fn read(&mut self, inputs: &mut u64) {
        *inputs = self.value;
    }

    fn write(&mut self, outputs: &u64) {
        if self.bound {
            self.value = *outputs;
        }
    }

    fn deinit(&mut self) {
        self.bound = false;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
