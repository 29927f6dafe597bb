use std::path::PathBuf;
use structopt::StructOpt;

use sgfx::api::{SgfxApi, SgfxApiDef, SgfxBackendType, SgfxDeviceStats, SgfxResult};

use crate::camera::FlyCamera;
use crate::frame_target::FrameTarget;
use crate::input::{InputState, ScriptedInput};
use crate::scenes::{DemoScene, Scene, SceneFrame};
use crate::shaders::ShaderLoader;
use crate::time::{PeriodicEvent, TimeState};

pub mod camera;
pub mod frame_target;
pub mod geometry;
pub mod input;
pub mod scenes;
pub mod shaders;
pub mod time;

#[derive(StructOpt, Debug)]
pub struct DemoArgs {
    /// Graphics backend: null, dx11 or dx12
    #[structopt(long, default_value = "null")]
    pub backend: SgfxBackendType,

    /// Scene to render: cubes, particles, grass, oit, ffd or deferred
    #[structopt(long, default_value = "cubes")]
    pub scene: Scene,

    /// Number of frames to render before exiting
    #[structopt(long, default_value = "120")]
    pub frames: u32,

    #[structopt(long, default_value = "1280")]
    pub width: u32,

    #[structopt(long, default_value = "720")]
    pub height: u32,

    /// Directory containing the shader packages, defaults to the shaders shipped with the demo
    #[structopt(name = "shader-dir", long, parse(from_os_str))]
    pub shader_dir: Option<PathBuf>,
}

impl DemoArgs {
    fn shader_dir(&self) -> PathBuf {
        self.shader_dir
            .clone()
            .unwrap_or_else(shaders::default_shader_dir)
    }
}

/// Totals over a whole run
#[derive(Clone, Debug, Default)]
pub struct DemoStats {
    pub scene: Option<Scene>,
    pub backend: Option<SgfxBackendType>,
    pub frames: u32,
    pub totals: SgfxDeviceStats,
    /// Calls recorded by the null backend, zero on other backends
    pub native_calls: usize,
}

impl DemoStats {
    fn accumulate(
        &mut self,
        frame: &SgfxDeviceStats,
    ) {
        self.frames += 1;
        self.totals.render_passes += frame.render_passes;
        self.totals.draw_queues += frame.draw_queues;
        self.totals.draws += frame.draws;
        self.totals.compute_queues += frame.compute_queues;
        self.totals.dispatches += frame.dispatches;
        self.totals.presents += frame.presents;
    }
}

impl std::fmt::Display for DemoStats {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{} on {}: {} frames, {} render passes, {} draws, {} dispatches",
            self.scene.map(|scene| scene.name()).unwrap_or("no scene"),
            self.backend.map(|backend| backend.name()).unwrap_or("no backend"),
            self.frames,
            self.totals.render_passes,
            self.totals.draws,
            self.totals.dispatches,
        )?;

        if self.native_calls > 0 {
            write!(f, ", {} native calls", self.native_calls)?;
        }

        Ok(())
    }
}

fn create_api(backend: SgfxBackendType) -> SgfxResult<SgfxApi> {
    let api_def = SgfxApiDef::default();
    match backend {
        SgfxBackendType::Null => SgfxApi::new_null(&api_def),
        // The gl4 backend needs a context current on this thread and the demo runs headless
        SgfxBackendType::Gl4 => {
            Err("the gl4 backend needs a window, run a D3D or null backend".into())
        }
        #[cfg(all(windows, feature = "sgfx-dx11"))]
        SgfxBackendType::Dx11 => SgfxApi::new_dx11(&api_def, &Default::default()),
        #[cfg(all(windows, feature = "sgfx-dx12"))]
        SgfxBackendType::Dx12 => SgfxApi::new_dx12(&api_def, &Default::default()),
        #[allow(unreachable_patterns)]
        _ => Err(format!(
            "the {} backend is not enabled in this build",
            backend.name()
        )
        .into()),
    }
}

struct DemoApp {
    scene: Box<dyn DemoScene>,
    target: FrameTarget,
    camera: FlyCamera,
    input_state: InputState,
    scripted_input: ScriptedInput,
    time_state: TimeState,
    print_stats_event: PeriodicEvent,
    stats: DemoStats,
}

impl DemoApp {
    fn init(
        args: &DemoArgs,
        api: &mut SgfxApi,
    ) -> SgfxResult<Self> {
        #[cfg(feature = "profile-with-tracy")]
        profiling::tracy_client::Client::start();
        #[cfg(feature = "profile-with-optick")]
        profiling::optick::register_thread("Main Thread");

        let device = api.device_mut();
        let shaders = ShaderLoader::new(args.shader_dir(), device.backend_type());
        let target = FrameTarget::new(device, args.width, args.height)?;
        let scene = match scenes::create_scene(args.scene, device, &shaders, &target) {
            Ok(scene) => scene,
            Err(e) => {
                target.destroy(device)?;
                return Err(e);
            }
        };

        Ok(DemoApp {
            scene,
            target,
            camera: args.scene.initial_camera(),
            input_state: InputState::new(),
            scripted_input: ScriptedInput::fly_around(),
            time_state: TimeState::with_fixed_step(std::time::Duration::from_secs_f32(1.0 / 60.0)),
            print_stats_event: PeriodicEvent::default(),
            stats: DemoStats {
                scene: Some(args.scene),
                backend: Some(args.backend),
                ..Default::default()
            },
        })
    }

    fn update(
        &mut self,
        api: &mut SgfxApi,
    ) -> SgfxResult<()> {
        profiling::scope!("Main Loop");

        self.time_state.update();
        self.scripted_input
            .update(self.time_state.update_count(), &mut self.input_state);
        self.camera.update(&self.input_state, &self.time_state);

        let device = api.device_mut();
        {
            profiling::scope!("Scene");
            let frame = SceneFrame {
                input: &self.input_state,
                time: &self.time_state,
                camera: &self.camera,
            };
            self.scene.update(device, &frame, &self.target)?;
            self.scene.render(device, &self.target)?;
        }

        device.flush()?;
        let frame_stats = device.take_stats();
        self.stats.accumulate(&frame_stats);
        if let Some(null_device) = device.null_device_mut() {
            self.stats.native_calls += null_device.take_calls().len();
        }

        if self.print_stats_event.try_take_event(
            std::time::Instant::now(),
            std::time::Duration::from_secs_f32(1.0),
        ) {
            log::info!(
                "Frame {}: {} render passes, {} draws, {} dispatches",
                self.stats.frames,
                frame_stats.render_passes,
                frame_stats.draws,
                frame_stats.dispatches
            );
        }

        self.input_state.end_frame();
        profiling::finish_frame!();
        Ok(())
    }

    fn destroy(
        mut self,
        api: &mut SgfxApi,
    ) -> SgfxResult<DemoStats> {
        let device = api.device_mut();
        self.scene.destroy(device)?;
        self.target.destroy(device)?;
        Ok(self.stats)
    }
}

/// Renders `args.frames` frames of the chosen scene into an offscreen target, then tears
/// everything down. Fails if anything created by the scene was leaked.
pub fn run(args: &DemoArgs) -> SgfxResult<DemoStats> {
    log::info!(
        "Running {} on the {} backend for {} frames at {}x{}",
        args.scene.name(),
        args.backend.name(),
        args.frames,
        args.width,
        args.height
    );

    let mut api = create_api(args.backend)?;
    // Dropping the api on failure releases and logs whatever the scene created
    let mut app = DemoApp::init(args, &mut api)?;

    let mut result = Ok(());
    for _ in 0..args.frames {
        result = app.update(&mut api);
        if result.is_err() {
            break;
        }
    }

    let stats = app.destroy(&mut api);
    let destroy_result = api.destroy();
    result?;
    let stats = stats?;
    destroy_result?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args(scene: Scene) -> DemoArgs {
        DemoArgs {
            backend: SgfxBackendType::Null,
            scene,
            frames: 4,
            width: 160,
            height: 90,
            shader_dir: None,
        }
    }

    #[test]
    fn test_parse_args() {
        let args = DemoArgs::from_iter_safe([
            "demo",
            "--scene",
            "grass",
            "--frames",
            "10",
            "--width",
            "640",
        ])
        .unwrap();
        assert_eq!(args.backend, SgfxBackendType::Null);
        assert_eq!(args.scene, Scene::Grass);
        assert_eq!(args.frames, 10);
        assert_eq!(args.width, 640);
        assert_eq!(args.height, 720);
        assert!(args.shader_dir.is_none());

        assert!(DemoArgs::from_iter_safe(["demo", "--scene", "teapot"]).is_err());
    }

    #[test]
    fn test_run_null_backend() {
        let stats = run(&test_args(Scene::Oit)).unwrap();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.totals.render_passes, 4 * 3);
        assert!(stats.totals.draws > 0);
        assert!(stats.native_calls > 0);

        let summary = stats.to_string();
        assert!(summary.starts_with("oit on null: 4 frames"));
    }

    #[test]
    fn test_missing_shader_dir_fails() {
        let mut args = test_args(Scene::Cubes);
        args.shader_dir = Some(PathBuf::from("/nonexistent/sgfx/shaders"));
        assert!(run(&args).is_err());
    }

    #[test]
    fn test_gl4_is_rejected() {
        let mut args = test_args(Scene::Cubes);
        args.backend = SgfxBackendType::Gl4;
        assert!(run(&args).is_err());
    }
}
