pub(crate) mod bootstrap;
pub(crate) mod demo_scene;
pub(crate) mod loop_runner;
pub(crate) mod scene_file;
