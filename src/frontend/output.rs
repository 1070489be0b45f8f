use smithay::delegate_output;
use smithay::output::{Mode, Output as WlOutput, PhysicalProperties, Scale, Subpixel};
use smithay::wayland::output::OutputHandler;

use crate::output::Output;
use crate::strata::{State, Strata};

impl OutputHandler for State {}

delegate_output!(State);

fn wire_mode(output: &Output) -> Mode {
    Mode {
        size: output.mode_size,
        refresh: i32::try_from(output.refresh).unwrap_or(i32::MAX),
    }
}

fn apply_state(wl_output: &WlOutput, output: &Output) {
    let mode = wire_mode(output);
    wl_output.change_current_state(
        Some(mode),
        Some(output.transform),
        Some(Scale::Fractional(output.scale)),
        Some(output.geometry.loc),
    );
    wl_output.set_preferred(mode);
}

impl Strata {
    /// Mirrors the compositor's outputs as `wl_output` globals.
    pub(super) fn sync_wire_outputs(&mut self) {
        let dh = self.frontend.display_handle.clone();

        let gone: Vec<_> = self
            .frontend
            .outputs
            .keys()
            .copied()
            .filter(|id| self.outputs.get(*id).is_none())
            .collect();
        for id in gone {
            if let Some((_, global)) = self.frontend.outputs.remove(&id) {
                debug!("removing wl_output global of {id:?}");
                dh.disable_global::<State>(global.clone());
                dh.remove_global::<State>(global);
            }
        }

        for output in self.outputs.iter() {
            if let Some((wl_output, _)) = self.frontend.outputs.get(&output.id) {
                let current = wl_output.current_mode();
                let location = wl_output.current_location();
                if current != Some(wire_mode(output))
                    || location != output.geometry.loc
                    || wl_output.current_transform() != output.transform
                    || wl_output.current_scale().fractional_scale() != output.scale
                {
                    apply_state(wl_output, output);
                }
                continue;
            }

            let wl_output = WlOutput::new(
                output.name.clone(),
                PhysicalProperties {
                    size: (0, 0).into(),
                    subpixel: Subpixel::Unknown,
                    make: "Strata".into(),
                    model: output.name.clone(),
                },
            );
            apply_state(&wl_output, output);
            let global = wl_output.create_global::<State>(&dh);
            debug!("created wl_output global for {:?}", output.id);
            self.frontend.outputs.insert(output.id, (wl_output, global));
        }
    }
}
