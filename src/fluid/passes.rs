// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use super::SolverOptions;

/// One of the seven simulation fields. Ping-pong pairs are addressed by
/// index so the buffer-swap rule (never read the buffer being written)
/// can be checked mechanically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Velocity(usize),
    Viscous(usize),
    Divergence,
    Pressure(usize),
}

impl FieldId {
    pub const ALL: [FieldId; 7] = [
        FieldId::Velocity(0),
        FieldId::Velocity(1),
        FieldId::Viscous(0),
        FieldId::Viscous(1),
        FieldId::Divergence,
        FieldId::Pressure(0),
        FieldId::Pressure(1),
    ];

    /// Dense index into a seven-element field table.
    pub fn slot(self) -> usize {
        match self {
            FieldId::Velocity(i) => i & 1,
            FieldId::Viscous(i) => 2 + (i & 1),
            FieldId::Divergence => 4,
            FieldId::Pressure(i) => 5 + (i & 1),
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self, FieldId::Velocity(_) | FieldId::Viscous(_))
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldId::Velocity(0) => "Velocity 0",
            FieldId::Velocity(_) => "Velocity 1",
            FieldId::Viscous(0) => "Viscous 0",
            FieldId::Viscous(_) => "Viscous 1",
            FieldId::Divergence => "Divergence",
            FieldId::Pressure(0) => "Pressure 0",
            FieldId::Pressure(_) => "Pressure 1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Advect,
    ExternalForce,
    Viscous,
    Divergence,
    Poisson,
    Project,
}

impl PassKind {
    pub fn label(self) -> &'static str {
        match self {
            PassKind::Advect => "Advect Velocity",
            PassKind::ExternalForce => "External Force",
            PassKind::Viscous => "Viscous Jacobi",
            PassKind::Divergence => "Divergence",
            PassKind::Poisson => "Poisson Jacobi",
            PassKind::Project => "Subtract Gradient",
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            PassKind::Advect => "advect",
            PassKind::ExternalForce => "external_force",
            PassKind::Viscous => "viscous",
            PassKind::Divergence => "divergence",
            PassKind::Poisson => "poisson",
            PassKind::Project => "project",
        }
    }
}

/// A single full-grid pass: which kernel, what it reads, where it writes.
///
/// Input roles per kind:
/// - `Advect`, `ExternalForce`, `Divergence`: `primary` = velocity
/// - `Viscous`: `primary` = velocity before diffusion, `secondary` = previous iterate
/// - `Poisson`: `primary` = previous pressure, `secondary` = divergence
/// - `Project`: `primary` = pressure, `secondary` = velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassDescriptor {
    pub kind: PassKind,
    pub primary: FieldId,
    pub secondary: Option<FieldId>,
    pub output: FieldId,
}

impl PassDescriptor {
    fn single(kind: PassKind, input: FieldId, output: FieldId) -> Self {
        Self { kind, primary: input, secondary: None, output }
    }

    fn pair(kind: PassKind, primary: FieldId, secondary: FieldId, output: FieldId) -> Self {
        Self { kind, primary, secondary: Some(secondary), output }
    }

    pub fn reads(&self) -> impl Iterator<Item = FieldId> {
        std::iter::once(self.primary).chain(self.secondary)
    }

    /// Second binding for backends with a fixed two-input layout.
    pub fn secondary_or_primary(&self) -> FieldId {
        self.secondary.unwrap_or(self.primary)
    }
}

/// The ordered passes for one tick plus where the projected velocity lands.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub passes: Vec<PassDescriptor>,
    pub next_parity: usize,
}

/// Builds the per-tick pass sequence for velocity parity `parity`.
pub fn plan_step(options: &SolverOptions, parity: usize) -> StepPlan {
    let p = parity & 1;
    let q = 1 - p;
    let mut passes = Vec::with_capacity(4 + options.iterations_poisson as usize + options.iterations_viscous as usize);

    passes.push(PassDescriptor::single(PassKind::Advect, FieldId::Velocity(p), FieldId::Velocity(q)));
    passes.push(PassDescriptor::single(PassKind::ExternalForce, FieldId::Velocity(q), FieldId::Velocity(p)));

    let mut velocity = FieldId::Velocity(p);
    if options.is_viscous && options.iterations_viscous > 0 {
        for i in 0..options.iterations_viscous as usize {
            let read = i & 1;
            passes.push(PassDescriptor::pair(
                PassKind::Viscous,
                FieldId::Velocity(p),
                FieldId::Viscous(read),
                FieldId::Viscous(1 - read),
            ));
        }
        velocity = FieldId::Viscous(options.iterations_viscous as usize & 1);
    }

    passes.push(PassDescriptor::single(PassKind::Divergence, velocity, FieldId::Divergence));

    let iterations = options.iterations_poisson.max(1) as usize;
    for i in 0..iterations {
        let read = i & 1;
        passes.push(PassDescriptor::pair(
            PassKind::Poisson,
            FieldId::Pressure(read),
            FieldId::Divergence,
            FieldId::Pressure(1 - read),
        ));
    }
    let pressure = FieldId::Pressure(iterations & 1);

    passes.push(PassDescriptor::pair(PassKind::Project, pressure, velocity, FieldId::Velocity(q)));

    StepPlan { passes, next_parity: q }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(viscous: bool, iv: u32, ip: u32) -> SolverOptions {
        SolverOptions {
            is_viscous: viscous,
            iterations_viscous: iv,
            iterations_poisson: ip,
            ..SolverOptions::default()
        }
    }

    #[test]
    fn no_pass_reads_its_own_output() {
        for viscous in [false, true] {
            for iv in 1..6 {
                for ip in 1..6 {
                    for parity in 0..2 {
                        let plan = plan_step(&options(viscous, iv, ip), parity);
                        for pass in &plan.passes {
                            assert!(
                                pass.reads().all(|f| f != pass.output),
                                "{:?} reads its own output",
                                pass
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn pass_order_and_counts() {
        let plan = plan_step(&options(true, 3, 5), 0);
        let kinds: Vec<PassKind> = plan.passes.iter().map(|p| p.kind).collect();
        assert_eq!(kinds[0], PassKind::Advect);
        assert_eq!(kinds[1], PassKind::ExternalForce);
        assert_eq!(kinds.iter().filter(|k| **k == PassKind::Viscous).count(), 3);
        assert_eq!(kinds.iter().filter(|k| **k == PassKind::Poisson).count(), 5);
        assert_eq!(kinds[5], PassKind::Divergence);
        assert_eq!(*kinds.last().unwrap(), PassKind::Project);
    }

    #[test]
    fn jacobi_chains_read_the_previous_iterate() {
        let plan = plan_step(&options(true, 4, 4), 1);
        let mut last_pressure = None;
        let mut last_viscous = None;
        for pass in &plan.passes {
            match pass.kind {
                PassKind::Poisson => {
                    if let Some(prev) = last_pressure {
                        assert_eq!(pass.primary, prev);
                    }
                    last_pressure = Some(pass.output);
                }
                PassKind::Viscous => {
                    if let Some(prev) = last_viscous {
                        assert_eq!(pass.secondary, Some(prev));
                    }
                    last_viscous = Some(pass.output);
                }
                PassKind::Divergence => assert_eq!(Some(pass.primary), last_viscous),
                PassKind::Project => {
                    assert_eq!(Some(pass.primary), last_pressure);
                    assert_eq!(pass.secondary, last_viscous);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn projection_flips_velocity_parity() {
        let plan = plan_step(&options(false, 32, 32), 0);
        assert_eq!(plan.next_parity, 1);
        assert_eq!(plan.passes.last().unwrap().output, FieldId::Velocity(1));
        assert_eq!(plan.passes[0].primary, FieldId::Velocity(0));

        let next = plan_step(&options(false, 32, 32), plan.next_parity);
        assert_eq!(next.passes[0].primary, FieldId::Velocity(1));
    }

    #[test]
    fn slots_are_unique() {
        let mut seen = [false; 7];
        for field in FieldId::ALL {
            assert!(!seen[field.slot()]);
            seen[field.slot()] = true;
        }
    }
}
