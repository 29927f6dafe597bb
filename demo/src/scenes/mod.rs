use crate::camera::FlyCamera;
use crate::frame_target::FrameTarget;
use crate::input::InputState;
use crate::shaders::ShaderLoader;
use crate::time::TimeState;
use sgfx::api::{SgfxDevice, SgfxResult};
use std::str::FromStr;

mod util;
pub use util::*;

mod cubes;
pub use cubes::CubesScene;

mod particles;
pub use particles::ParticlesScene;

mod grass;
pub use grass::GrassScene;

mod oit;
pub use oit::OitScene;

mod ffd;
pub use ffd::FfdScene;

mod deferred;
pub use deferred::DeferredScene;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scene {
    Cubes,
    Particles,
    Grass,
    Oit,
    Ffd,
    Deferred,
}

pub const ALL_SCENES: [Scene; 6] = [
    Scene::Cubes,
    Scene::Particles,
    Scene::Grass,
    Scene::Oit,
    Scene::Ffd,
    Scene::Deferred,
];

impl Scene {
    pub fn name(self) -> &'static str {
        match self {
            Scene::Cubes => "cubes",
            Scene::Particles => "particles",
            Scene::Grass => "grass",
            Scene::Oit => "oit",
            Scene::Ffd => "ffd",
            Scene::Deferred => "deferred",
        }
    }

    /// Camera placed to frame the scene's content
    pub fn initial_camera(self) -> FlyCamera {
        match self {
            Scene::Cubes => FlyCamera::new(glam::Vec3::new(0.0, 12.0, -40.0), 0.0, -0.3),
            Scene::Particles => FlyCamera::new(glam::Vec3::new(0.0, 5.0, -30.0), 0.0, -0.1),
            Scene::Grass => FlyCamera::new(glam::Vec3::new(0.0, 3.0, -60.0), 0.0, -0.15),
            Scene::Oit => FlyCamera::new(glam::Vec3::new(0.0, 2.0, -12.0), 0.0, -0.1),
            Scene::Ffd => FlyCamera::new(glam::Vec3::new(0.0, 1.0, -6.0), 0.0, -0.1),
            Scene::Deferred => FlyCamera::new(glam::Vec3::new(0.0, 6.0, -18.0), 0.0, -0.3),
        }
    }
}

impl FromStr for Scene {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_SCENES
            .iter()
            .copied()
            .find(|scene| scene.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = ALL_SCENES.iter().map(|scene| scene.name()).collect();
                format!("unknown scene {}, expected one of {}", s, names.join(", "))
            })
    }
}

/// Per-frame inputs handed to a scene's update
pub struct SceneFrame<'a> {
    pub input: &'a InputState,
    pub time: &'a TimeState,
    pub camera: &'a FlyCamera,
}

pub trait DemoScene {
    /// Writes per-frame data (constant buffers, animated instances) and runs compute work
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()>;

    /// Records and submits the scene's render passes into the frame target
    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()>;

    fn destroy(
        &mut self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<()>;
}

pub fn create_scene(
    scene: Scene,
    device: &mut SgfxDevice,
    shaders: &ShaderLoader,
    target: &FrameTarget,
) -> SgfxResult<Box<dyn DemoScene>> {
    profiling::scope!("create_scene");
    log::info!("Creating scene {}", scene.name());

    Ok(match scene {
        Scene::Cubes => Box::new(CubesScene::new(device, shaders, target)?),
        Scene::Particles => Box::new(ParticlesScene::new(device, shaders, target)?),
        Scene::Grass => Box::new(GrassScene::new(device, shaders, target)?),
        Scene::Oit => Box::new(OitScene::new(device, shaders, target)?),
        Scene::Ffd => Box::new(FfdScene::new(device, shaders, target)?),
        Scene::Deferred => Box::new(DeferredScene::new(device, shaders, target)?),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::shaders::default_shader_dir;
    use sgfx::api::{SgfxApi, SgfxApiDef, SgfxBackendType, SgfxDeviceStats, SgfxNullCall};

    pub const TEST_WIDTH: u32 = 320;
    pub const TEST_HEIGHT: u32 = 180;

    /// Null device, frame target and shader loader for scene tests
    pub struct SceneHarness {
        pub api: SgfxApi,
        pub target: FrameTarget,
        pub shaders: ShaderLoader,
        pub input: InputState,
        pub time: TimeState,
    }

    impl SceneHarness {
        pub fn new() -> Self {
            let mut api = SgfxApi::new_null(&SgfxApiDef::default()).unwrap();
            let target = FrameTarget::new(api.device_mut(), TEST_WIDTH, TEST_HEIGHT).unwrap();
            SceneHarness {
                api,
                target,
                shaders: ShaderLoader::new(default_shader_dir(), SgfxBackendType::Null),
                input: InputState::new(),
                time: TimeState::with_fixed_step(std::time::Duration::from_millis(16)),
            }
        }

        pub fn device(&mut self) -> &mut SgfxDevice {
            self.api.device_mut()
        }

        /// Runs one update and render, returning the frame's stats and native calls
        pub fn run_frame(
            &mut self,
            scene: &mut dyn DemoScene,
            camera: &FlyCamera,
        ) -> (SgfxDeviceStats, Vec<SgfxNullCall>) {
            self.time.update();
            let device = self.api.device_mut();
            let frame = SceneFrame {
                input: &self.input,
                time: &self.time,
                camera,
            };
            scene.update(device, &frame, &self.target).unwrap();
            scene.render(device, &self.target).unwrap();
            device.flush().unwrap();
            assert!(!device.is_in_render_pass());

            let stats = device.take_stats();
            let calls = device.null_device_mut().unwrap().take_calls();
            (stats, calls)
        }

        /// Destroys the scene and target and checks nothing leaked
        pub fn finish(
            mut self,
            mut scene: Box<dyn DemoScene>,
        ) {
            scene.destroy(self.api.device_mut()).unwrap();
            self.target.destroy(self.api.device_mut()).unwrap();
            assert_eq!(self.api.device().live_resources().total(), 0);
            self.api.destroy().unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_scene_names_round_trip() {
        for scene in ALL_SCENES.iter() {
            assert_eq!(scene.name().parse::<Scene>().unwrap(), *scene);
        }

        assert_eq!("OIT".parse::<Scene>().unwrap(), Scene::Oit);
        assert!("teapot".parse::<Scene>().is_err());
    }

    #[test]
    fn test_every_scene_runs_and_cleans_up() {
        for &scene in ALL_SCENES.iter() {
            let mut harness = SceneHarness::new();
            let camera = scene.initial_camera();
            let mut demo_scene = create_scene(
                scene,
                harness.api.device_mut(),
                &harness.shaders,
                &harness.target,
            )
            .unwrap();

            for _ in 0..3 {
                let (stats, _) = harness.run_frame(demo_scene.as_mut(), &camera);
                assert!(stats.render_passes > 0, "{} rendered nothing", scene.name());
                assert!(stats.draws > 0, "{} issued no draws", scene.name());
            }

            harness.finish(demo_scene);
        }
    }
}
