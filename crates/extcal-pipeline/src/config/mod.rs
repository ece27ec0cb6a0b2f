//! Loading and validation of camera, target and job definitions.
//!
//! Documents are parsed into serde records ([`documents`]), then converted
//! into a validated [`JobDefinition`]. Nothing is committed to a job until all
//! three documents parsed and validated.

pub mod documents;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use extcal_core::{
    all_finite, BrownConrady5, Camera, CameraIntrinsics, Pose6, Pt3, Roi, Scene, Target,
    TriggerConfig,
};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::error::{ConfigError, DocumentKind, RegistryError};
use crate::job::JobOptions;
use crate::registry::EntityRegistry;

pub use documents::{
    CameraDocument, CameraRecord, JobDocument, ObservationRecord, PointRecord, SceneRecord,
    TargetDocument, TargetRecord,
};

/// Serialization format of a document, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentFormat::Yaml
            }
            _ => DocumentFormat::Json,
        }
    }
}

/// Parse `text` as a document of type `T`.
pub fn parse_document<T: DeserializeOwned>(
    kind: DocumentKind,
    origin: &str,
    text: &str,
    format: DocumentFormat,
) -> Result<T, ConfigError> {
    let parsed = match format {
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        kind,
        origin: origin.to_string(),
        message,
    })
}

/// Read and parse the document at `path`.
pub fn read_document<T: DeserializeOwned>(
    kind: DocumentKind,
    path: &Path,
) -> Result<T, ConfigError> {
    let origin = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        kind,
        origin: origin.clone(),
        source,
    })?;
    parse_document(kind, &origin, &text, DocumentFormat::from_path(path))
}

/// Locations of the three configuration documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSources {
    pub cameras: PathBuf,
    pub targets: PathBuf,
    pub job: PathBuf,
}

impl JobSources {
    pub fn new(
        cameras: impl Into<PathBuf>,
        targets: impl Into<PathBuf>,
        job: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cameras: cameras.into(),
            targets: targets.into(),
            job: job.into(),
        }
    }

    /// Read, parse and validate all three documents.
    pub fn read(&self) -> Result<JobDefinition, ConfigError> {
        let cameras: CameraDocument = read_document(DocumentKind::Cameras, &self.cameras)?;
        let targets: TargetDocument = read_document(DocumentKind::Targets, &self.targets)?;
        let job: JobDocument = read_document(DocumentKind::Job, &self.job)?;
        Ok(JobDefinition {
            reference_frame: job.reference_frame.clone(),
            cameras: build_cameras(&cameras, &self.cameras.display().to_string())?,
            targets: build_targets(&targets, &self.targets.display().to_string())?,
            scenes: build_scenes(&job, &self.job.display().to_string())?,
            options: job.options,
        })
    }
}

/// Validated cameras, targets, scenes and options of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDefinition {
    pub reference_frame: String,
    pub cameras: Vec<Camera>,
    pub targets: Vec<Target>,
    /// Sorted by ascending scene id.
    pub scenes: Vec<Scene>,
    pub options: JobOptions,
}

const IN_MEMORY: &str = "<memory>";

impl JobDefinition {
    /// Validate already parsed documents.
    pub fn from_documents(
        cameras: &CameraDocument,
        targets: &TargetDocument,
        job: &JobDocument,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            reference_frame: job.reference_frame.clone(),
            cameras: build_cameras(cameras, IN_MEMORY)?,
            targets: build_targets(targets, IN_MEMORY)?,
            scenes: build_scenes(job, IN_MEMORY)?,
            options: job.options.clone(),
        })
    }

    /// Register every defined entity: static ones with their single blocks,
    /// moving ones without per-scene blocks (those are created on first sighting).
    ///
    /// Failures name the document and entity they came from.
    pub fn seed_registry(&self, registry: &mut EntityRegistry) -> Result<(), ConfigError> {
        for camera in &self.cameras {
            let seeded = if camera.is_moving() {
                registry.declare_moving_camera(camera).map(|_| ())
            } else {
                registry.register_static_camera(camera).map(|_| ())
            };
            seeded.map_err(|err| seeding_failed(DocumentKind::Cameras, &camera.name, err))?;
        }
        for target in &self.targets {
            let seeded = if target.is_moving() {
                registry.declare_moving_target(target).map(|_| ())
            } else {
                registry.register_static_target(target).map(|_| ())
            };
            seeded.map_err(|err| seeding_failed(DocumentKind::Targets, &target.name, err))?;
        }
        debug!(
            "seeded registry: {} cameras, {} targets, {} blocks",
            registry.num_cameras(),
            registry.num_targets(),
            registry.arena().len()
        );
        Ok(())
    }

    /// Fresh registry seeded from this definition.
    pub fn build_registry(&self) -> Result<EntityRegistry, ConfigError> {
        let mut registry = EntityRegistry::new();
        self.seed_registry(&mut registry)?;
        Ok(registry)
    }

    pub fn camera(&self, name: &str) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}

fn seeding_failed(kind: DocumentKind, name: &str, err: RegistryError) -> ConfigError {
    invalid(kind, IN_MEMORY, format!("{kind} `{name}`"), err.to_string())
}

fn invalid(
    kind: DocumentKind,
    origin: &str,
    entity: impl Into<String>,
    reason: impl Into<String>,
) -> ConfigError {
    ConfigError::Invalid {
        kind,
        origin: origin.to_string(),
        entity: entity.into(),
        reason: reason.into(),
    }
}

fn camera_from_record(
    record: &CameraRecord,
    origin: &str,
) -> Result<(CameraIntrinsics, Pose6), ConfigError> {
    let entity = format!("camera `{}`", record.camera_name);
    let err = |reason: &str| invalid(DocumentKind::Cameras, origin, entity.clone(), reason);
    if record.camera_name.is_empty() {
        return Err(err("empty camera_name"));
    }
    let intrinsics = CameraIntrinsics::pinhole(
        record.focal_length_x,
        record.focal_length_y,
        record.center_x,
        record.center_y,
    )
    .with_distortion(BrownConrady5::new(
        record.distortion_k1,
        record.distortion_k2,
        record.distortion_k3,
        record.distortion_p1,
        record.distortion_p2,
    ));
    if !intrinsics.is_finite() {
        return Err(err("non-finite intrinsics"));
    }
    if intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
        return Err(err("focal lengths must be positive"));
    }
    let pose = Pose6::new(
        [record.angle_axis_ax, record.angle_axis_ay, record.angle_axis_az],
        [record.position_x, record.position_y, record.position_z],
    );
    if !pose.is_finite() {
        return Err(err("non-finite pose"));
    }
    Ok((intrinsics, pose))
}

fn build_cameras(doc: &CameraDocument, origin: &str) -> Result<Vec<Camera>, ConfigError> {
    let kind = DocumentKind::Cameras;
    let mut cameras: Vec<Camera> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for record in &doc.static_cameras {
        let (intrinsics, pose) = camera_from_record(record, origin)?;
        if index.contains_key(&record.camera_name) {
            let entity = format!("camera `{}`", record.camera_name);
            return Err(invalid(kind, origin, entity, "duplicate static camera"));
        }
        let mut camera = Camera::new_static(&record.camera_name, intrinsics, pose)
            .with_source(&record.image_topic);
        camera.fix_intrinsics = record.fix_intrinsics;
        index.insert(record.camera_name.clone(), cameras.len());
        cameras.push(camera);
    }

    for record in &doc.moving_cameras {
        let (intrinsics, pose) = camera_from_record(record, origin)?;
        let entity = format!("camera `{}`", record.camera_name);
        let Some(scene) = record.scene_id else {
            return Err(invalid(kind, origin, entity, "moving camera requires scene_id"));
        };
        match index.get(&record.camera_name) {
            Some(&idx) => {
                let camera = &mut cameras[idx];
                if !camera.is_moving() {
                    return Err(invalid(kind, origin, entity, "declared both static and moving"));
                }
                if camera.motion.set_scene_pose(scene, pose).is_some() {
                    let reason = format!("duplicate entry for scene {scene}");
                    return Err(invalid(kind, origin, entity, reason));
                }
                if camera.intrinsics != intrinsics {
                    warn!(
                        "{}: scene {} entry has different intrinsics; keeping the first entry's",
                        entity, scene
                    );
                }
            }
            None => {
                let mut camera = Camera::new_moving(&record.camera_name, intrinsics, pose)
                    .with_source(&record.image_topic)
                    .with_scene_pose(scene, pose);
                camera.fix_intrinsics = record.fix_intrinsics;
                index.insert(record.camera_name.clone(), cameras.len());
                cameras.push(camera);
            }
        }
    }
    Ok(cameras)
}

fn target_from_record(
    record: &TargetRecord,
    origin: &str,
) -> Result<(Pose6, Vec<Pt3>), ConfigError> {
    let entity = format!("target `{}`", record.target_name);
    let err = |reason: String| invalid(DocumentKind::Targets, origin, entity.clone(), reason);
    if record.target_name.is_empty() {
        return Err(err("empty target_name".to_string()));
    }
    if record.points.is_empty() {
        return Err(err("target defines no points".to_string()));
    }
    if let Some(declared) = record.num_points {
        if declared != record.points.len() {
            return Err(err(format!(
                "num_points is {declared} but {} points are listed",
                record.points.len()
            )));
        }
    }
    let points: Vec<Pt3> = record
        .points
        .iter()
        .map(|p| Pt3::new(p.pnt[0], p.pnt[1], p.pnt[2]))
        .collect();
    if !record.points.iter().all(|p| all_finite(&p.pnt)) {
        return Err(err("non-finite point coordinates".to_string()));
    }
    let pose = Pose6::new(
        [record.angle_axis_ax, record.angle_axis_ay, record.angle_axis_az],
        [record.position_x, record.position_y, record.position_z],
    );
    if !pose.is_finite() {
        return Err(err("non-finite pose".to_string()));
    }
    Ok((pose, points))
}

fn apply_target_flags(mut target: Target, record: &TargetRecord) -> Target {
    target = target.with_grid(record.target_rows, record.target_cols);
    target.fix_points = record.fix_points;
    target.fix_pose = record.fix_pose;
    target
}

fn build_targets(doc: &TargetDocument, origin: &str) -> Result<Vec<Target>, ConfigError> {
    let kind = DocumentKind::Targets;
    let mut targets: Vec<Target> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for record in &doc.static_targets {
        let (pose, points) = target_from_record(record, origin)?;
        if index.contains_key(&record.target_name) {
            let entity = format!("target `{}`", record.target_name);
            return Err(invalid(kind, origin, entity, "duplicate static target"));
        }
        let target = Target::new_static(&record.target_name, pose, points);
        index.insert(record.target_name.clone(), targets.len());
        targets.push(apply_target_flags(target, record));
    }

    for record in &doc.moving_targets {
        let (pose, points) = target_from_record(record, origin)?;
        let entity = format!("target `{}`", record.target_name);
        let Some(scene) = record.scene_id else {
            return Err(invalid(kind, origin, entity, "moving target requires scene_id"));
        };
        match index.get(&record.target_name) {
            Some(&idx) => {
                let target = &mut targets[idx];
                if !target.is_moving() {
                    return Err(invalid(kind, origin, entity, "declared both static and moving"));
                }
                if target.points != points {
                    let reason = format!("scene {scene} entry redefines the point geometry");
                    return Err(invalid(kind, origin, entity, reason));
                }
                if target.motion.set_scene_pose(scene, pose).is_some() {
                    let reason = format!("duplicate entry for scene {scene}");
                    return Err(invalid(kind, origin, entity, reason));
                }
            }
            None => {
                let target = Target::new_moving(&record.target_name, pose, points)
                    .with_scene_pose(scene, pose);
                index.insert(record.target_name.clone(), targets.len());
                targets.push(apply_target_flags(target, record));
            }
        }
    }
    Ok(targets)
}

fn build_scenes(doc: &JobDocument, origin: &str) -> Result<Vec<Scene>, ConfigError> {
    let kind = DocumentKind::Job;
    if doc.scenes.is_empty() {
        return Err(invalid(kind, origin, "scenes", "job defines no scenes"));
    }
    let mut seen = HashSet::new();
    let mut scenes = Vec::with_capacity(doc.scenes.len());
    for record in &doc.scenes {
        let entity = format!("scene {}", record.scene_id);
        if !seen.insert(record.scene_id) {
            return Err(invalid(kind, origin, entity, "duplicate scene_id"));
        }
        if record.observations.is_empty() {
            warn!("{} has no observation commands", entity);
        }
        let trigger = TriggerConfig {
            trigger_type: record.trigger_type,
            message: record.trigger_message.clone(),
        };
        let mut scene = Scene::new(record.scene_id, trigger);
        for obs in &record.observations {
            let roi = Roi::new(obs.roi_x_min, obs.roi_x_max, obs.roi_y_min, obs.roi_y_max);
            let bounds = [roi.x_min, roi.x_max, roi.y_min, roi.y_max];
            if !all_finite(&bounds) || !roi.is_valid() {
                return Err(invalid(
                    kind,
                    origin,
                    format!("{entity} camera `{}` target `{}`", obs.camera, obs.target),
                    format!("invalid roi {:?}", bounds),
                ));
            }
            scene = scene.with_command(&obs.camera, &obs.target, roi);
        }
        scenes.push(scene);
    }
    scenes.sort_by_key(|scene| scene.id);
    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERAS: &str = r#"
static_cameras:
  - camera_name: left
    image_topic: /left/image
    angle_axis_ax: 0.0
    angle_axis_ay: 0.0
    angle_axis_az: 0.0
    position_x: 0.1
    position_y: 0.0
    position_z: 0.0
    focal_length_x: 500.0
    focal_length_y: 500.0
    center_x: 320.0
    center_y: 240.0
moving_cameras:
  - camera_name: arm
    scene_id: 2
    angle_axis_ax: 0.0
    angle_axis_ay: 0.0
    angle_axis_az: 0.0
    position_x: 0.0
    position_y: 0.0
    position_z: 0.5
    focal_length_x: 400.0
    focal_length_y: 400.0
    center_x: 200.0
    center_y: 150.0
    distortion_k1: -0.1
  - camera_name: arm
    scene_id: 1
    angle_axis_ax: 0.0
    angle_axis_ay: 0.0
    angle_axis_az: 0.0
    position_x: 0.0
    position_y: 0.0
    position_z: 0.7
    focal_length_x: 400.0
    focal_length_y: 400.0
    center_x: 200.0
    center_y: 150.0
"#;

    const TARGETS: &str = r#"
static_targets:
  - target_name: board
    target_rows: 1
    target_cols: 2
    angle_axis_ax: 0.0
    angle_axis_ay: 0.0
    angle_axis_az: 0.0
    position_x: 0.0
    position_y: 0.0
    position_z: 2.0
    num_points: 2
    points:
      - pnt: [0.0, 0.0, 0.0]
      - pnt: [0.1, 0.0, 0.0]
    fix_pose: true
"#;

    const JOB: &str = r#"
reference_frame: world
options:
  observation_timeout_ms: 100
scenes:
  - scene_id: 2
    observations:
      - camera: arm
        target: board
        roi_x_min: 0.0
        roi_x_max: 400.0
        roi_y_min: 0.0
        roi_y_max: 300.0
  - scene_id: 1
    trigger_type: 3
    observations:
      - camera: left
        target: board
        roi_x_min: 0.0
        roi_x_max: 640.0
        roi_y_min: 0.0
        roi_y_max: 480.0
"#;

    fn docs() -> (CameraDocument, TargetDocument, JobDocument) {
        let fmt = DocumentFormat::Yaml;
        (
            parse_document(DocumentKind::Cameras, "cameras.yaml", CAMERAS, fmt).unwrap(),
            parse_document(DocumentKind::Targets, "targets.yaml", TARGETS, fmt).unwrap(),
            parse_document(DocumentKind::Job, "job.yaml", JOB, fmt).unwrap(),
        )
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.YAML")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), DocumentFormat::Json);
    }

    #[test]
    fn builds_definition_from_yaml() {
        let (cameras, targets, job) = docs();
        let def = JobDefinition::from_documents(&cameras, &targets, &job).unwrap();

        assert_eq!(def.reference_frame, "world");
        assert_eq!(def.options.observation_timeout_ms, 100);
        assert_eq!(def.scenes.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(def.scenes[0].trigger.trigger_type, 3);

        let left = def.camera("left").unwrap();
        assert!(!left.is_moving());
        assert_eq!(left.source, "/left/image");

        let arm = def.camera("arm").unwrap();
        assert!(arm.is_moving());
        assert_eq!(arm.motion.seeded_scenes(), vec![1, 2]);
        assert_eq!(arm.initial_pose(1).position, [0.0, 0.0, 0.7]);
        assert_eq!(arm.initial_pose(2).position, [0.0, 0.0, 0.5]);
        assert_eq!(arm.intrinsics.distortion.k1, -0.1);

        let board = def.target("board").unwrap();
        assert_eq!(board.num_points(), 2);
        assert_eq!((board.rows, board.cols), (1, 2));
        assert_eq!(board.fix_pose, Some(true));
    }

    #[test]
    fn seeding_creates_static_blocks_only() {
        let (cameras, targets, job) = docs();
        let def = JobDefinition::from_documents(&cameras, &targets, &job).unwrap();
        let registry = def.build_registry().unwrap();

        assert_eq!(registry.num_cameras(), 2);
        assert_eq!(registry.num_targets(), 1);
        assert_eq!(registry.camera_pose_blocks("left").unwrap().len(), 1);
        assert!(registry.camera_pose_blocks("arm").unwrap().is_empty());
        // left: intrinsics + extrinsics, arm: intrinsics, board: 2 points + pose
        assert_eq!(registry.arena().len(), 6);
    }

    #[test]
    fn target_seeding_failure_names_the_target_document() {
        let (cameras, targets, job) = docs();
        let mut def = JobDefinition::from_documents(&cameras, &targets, &job).unwrap();
        let board = def.target("board").unwrap();
        let moving = Target::new_moving("board", board.motion.default_pose(), board.points.clone());
        def.targets.push(moving);

        let err = def.build_registry().unwrap_err();
        assert_eq!(err.kind(), DocumentKind::Targets);
        assert!(err.to_string().contains("target `board`"), "{err}");
    }

    #[test]
    fn point_count_mismatch_is_rejected() {
        let (cameras, mut targets, job) = docs();
        targets.static_targets[0].num_points = Some(3);
        let err = JobDefinition::from_documents(&cameras, &targets, &job).unwrap_err();
        assert_eq!(err.kind(), DocumentKind::Targets);
        assert!(err.to_string().contains("num_points is 3"), "{err}");
    }

    #[test]
    fn static_and_moving_name_clash_is_rejected() {
        let (mut cameras, targets, job) = docs();
        let mut clash = cameras.moving_cameras[0].clone();
        clash.camera_name = "left".into();
        cameras.moving_cameras.push(clash);
        let err = JobDefinition::from_documents(&cameras, &targets, &job).unwrap_err();
        assert!(err.to_string().contains("both static and moving"), "{err}");
    }

    #[test]
    fn duplicate_moving_scene_entry_is_rejected() {
        let (mut cameras, targets, job) = docs();
        let dup = cameras.moving_cameras[0].clone();
        cameras.moving_cameras.push(dup);
        let err = JobDefinition::from_documents(&cameras, &targets, &job).unwrap_err();
        assert!(err.to_string().contains("duplicate entry for scene 2"), "{err}");
    }

    #[test]
    fn moving_entry_without_scene_is_rejected() {
        let (mut cameras, targets, job) = docs();
        cameras.moving_cameras[0].scene_id = None;
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_err());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let (mut cameras, targets, job) = docs();
        cameras.static_cameras[0].focal_length_x = 0.0;
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_err());

        let (mut cameras, targets, job) = docs();
        cameras.static_cameras[0].position_y = f64::NAN;
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_err());

        let (cameras, mut targets, job) = docs();
        targets.static_targets[0].points[1].pnt[2] = f64::INFINITY;
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_err());
    }

    #[test]
    fn scene_errors_are_rejected() {
        let (cameras, targets, mut job) = docs();
        job.scenes[0].observations[0].roi_x_min = 500.0;
        let err = JobDefinition::from_documents(&cameras, &targets, &job).unwrap_err();
        assert_eq!(err.kind(), DocumentKind::Job);

        let (cameras, targets, mut job) = docs();
        job.scenes[1].scene_id = 2;
        let err = JobDefinition::from_documents(&cameras, &targets, &job).unwrap_err();
        assert!(err.to_string().contains("duplicate scene_id"), "{err}");

        let (cameras, targets, mut job) = docs();
        job.scenes.clear();
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_err());
    }

    #[test]
    fn unknown_scene_references_are_not_load_errors() {
        let (cameras, targets, mut job) = docs();
        job.scenes[0].observations[0].camera = "ghost".into();
        assert!(JobDefinition::from_documents(&cameras, &targets, &job).is_ok());
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let text = r#"{"static_cameras": [{"camera_name": "c"}]}"#;
        let err = parse_document::<CameraDocument>(
            DocumentKind::Cameras,
            "cams.json",
            text,
            DocumentFormat::Json,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("cams.json"), "{err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let missing = Path::new("/nonexistent/job.yaml");
        let err = read_document::<JobDocument>(DocumentKind::Job, missing)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
