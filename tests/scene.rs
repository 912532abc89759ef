// tests/scene.rs
use glam::{Quat, Vec3};
use std::f32::consts::FRAC_PI_2;
use towscan::{
    AssetLayout, Body, BodyRole, ConfigError, CreateConfig, LayoutConfig, MemoryScene,
    ObjectKind, ObjectQuery, Placement, RaycastScanner, RunConfig, ScanError, ScanExecutor,
    ScanRequest, ScannerSettings, SceneError, SceneHost, SceneObject, SurfaceSpec, Coupling,
    create_scene, parse_str,
};

const TUG: &str = r#"
    <robot name="t5">
        <link name="base_link"/>
        <link name="caster"/>
        <joint name="caster_joint" type="fixed">
            <parent link="base_link"/><child link="caster"/><origin xyz="0.5 0 0"/>
        </joint>
    </robot>
"#;

const AIRCRAFT: &str = r#"
    <robot name="a320_ceo">
        <link name="fuselage"/>
        <link name="towbar"/>
        <joint name="towbar_joint" type="fixed">
            <parent link="fuselage"/><child link="towbar"/><origin xyz="-0.2 0 0"/>
        </joint>
    </robot>
"#;

fn settings() -> ScannerSettings {
    ScannerSettings {
        azimuth_step_deg: 2.0,
        channels: 5,
        ..ScannerSettings::default()
    }
}

fn request(id: &str) -> ScanRequest {
    ScanRequest {
        sensor: "lidar".into(),
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        output_id: id.into(),
    }
}

fn scan_scene() -> MemoryScene {
    let mut scene = MemoryScene::new();
    scene
        .spawn(SceneObject::new("lidar", ObjectKind::Sensor))
        .expect("sensor");
    // Sensor looks down -Z and spins about +Y with the identity rotation.
    scene
        .spawn(SceneObject::cuboid(
            "near",
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(0.5, 2.0, 2.0),
        ))
        .expect("near");
    scene
        .spawn(SceneObject::cuboid(
            "far",
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.5, 4.0, 4.0),
        ))
        .expect("far");
    scene
}

#[test]
fn test_world_bounds_follow_parent() {
    let mut scene = MemoryScene::new();
    scene
        .spawn(SceneObject::new("tug", ObjectKind::Mesh))
        .expect("tug");
    scene
        .spawn(SceneObject::cuboid(
            "cube",
            Vec3::new(2.0, 0.0, 0.5),
            Vec3::new(1.0, 0.5, 0.5),
        ))
        .expect("cube");
    scene.set_parent("cube", "tug").expect("parent");

    scene
        .set_placement(
            "tug",
            Placement {
                position: Vec3::new(1.0, 1.0, 0.0),
                rotation: Quat::from_rotation_z(FRAC_PI_2),
            },
        )
        .expect("move tug");

    let bounds = scene.world_bounds("cube").expect("cube has volume");
    // Rotated a quarter turn: the long axis now runs along y.
    assert!(Vec3::from(bounds.min).abs_diff_eq(Vec3::new(0.5, 2.0, 0.0), 1e-5));
    assert!(Vec3::from(bounds.max).abs_diff_eq(Vec3::new(1.5, 4.0, 1.0), 1e-5));
    assert!(scene.world_bounds("tug").is_none());
}

#[test]
fn test_parenting_keeps_world_placement_and_refuses_cycles() {
    let mut scene = MemoryScene::new();
    scene
        .spawn(
            SceneObject::new("a", ObjectKind::Empty).with_placement(Placement {
                position: Vec3::new(3.0, 0.0, 0.0),
                rotation: Quat::from_rotation_z(0.3),
            }),
        )
        .expect("a");
    scene
        .spawn(SceneObject::new("b", ObjectKind::Empty).with_placement(Placement::at(Vec3::Y)))
        .expect("b");

    scene.set_parent("b", "a").expect("parent");
    let world = scene.world_placement("b").expect("b");
    assert!(world.position.abs_diff_eq(Vec3::Y, 1e-5));

    assert!(matches!(
        scene.set_parent("a", "b"),
        Err(SceneError::ParentCycle { .. })
    ));
    assert!(matches!(
        scene.set_parent("b", "ghost"),
        Err(SceneError::UnknownObject(n)) if n == "ghost"
    ));
    assert!(matches!(
        scene.spawn(SceneObject::new("a", ObjectKind::Empty)),
        Err(SceneError::DuplicateObject(_))
    ));
}

#[test]
fn test_query_matches_kind_and_name() {
    let mut scene = MemoryScene::new();
    for object in [
        SceneObject::cuboid("Cube", Vec3::ZERO, Vec3::ONE),
        SceneObject::new("cube_marker", ObjectKind::Empty),
        SceneObject::cuboid("wall", Vec3::ZERO, Vec3::ONE),
        SceneObject::cuboid("big_CUBE_2", Vec3::ZERO, Vec3::ONE),
    ] {
        scene.spawn(object).expect("spawn");
    }

    let found = scene.list_objects_matching(&ObjectQuery::meshes().named_like("cube"));
    assert_eq!(found, ["Cube", "big_CUBE_2"]);
    assert_eq!(scene.object_names().len(), 4);
}

#[test]
fn test_raycast_hits_nearest_box() {
    let scanner = RaycastScanner::new(settings(), std::env::temp_dir());
    let scene = scan_scene();
    let targets: Vec<_> = ["near", "far"]
        .iter()
        .filter_map(|n| scene.world_bounds(n))
        .collect();

    let hits = scanner.cast(Vec3::ZERO, Quat::IDENTITY, &targets);
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(hit.x >= 4.5 - 1e-3 && hit.x <= 5.5 + 1e-3, "hit {hit} is not on the near box");
    }
    let closest = hits.iter().map(|h| h.length()).fold(f32::INFINITY, f32::min);
    assert!((closest - 4.5).abs() < 1e-3);
}

#[test]
fn test_scan_exports_and_reports_new_objects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut scanner = RaycastScanner::new(settings(), dir.path());
    let mut scene = scan_scene();

    let artifacts = scanner
        .scan(&mut scene, &request("yaw_000_near_scan_001"))
        .expect("scan");
    assert!(artifacts.point_count > 0);
    assert_eq!(artifacts.created_objects, ["yaw_000_near_scan_001"]);

    let path = artifacts.exported.expect("exported");
    assert_eq!(path, dir.path().join("yaw_000_near_scan_001.ply"));
    let text = std::fs::read_to_string(&path).expect("ply");
    assert!(text.starts_with("ply\nformat ascii 1.0\n"));
    assert!(text.contains(&format!("element vertex {}\n", artifacts.point_count)));
    let body = text.split("end_header\n").nth(1).expect("body");
    assert_eq!(body.lines().count(), artifacts.point_count);

    // Same id again: the new cloud gets a suffixed name.
    let again = scanner
        .scan(&mut scene, &request("yaw_000_near_scan_001"))
        .expect("scan");
    assert_eq!(again.created_objects, ["yaw_000_near_scan_001.001"]);
}

#[test]
fn test_scan_requires_sensor_and_valid_settings() {
    let mut scene = MemoryScene::new();
    let mut scanner = RaycastScanner::new(
        ScannerSettings {
            export: false,
            ..settings()
        },
        std::env::temp_dir(),
    );
    assert!(matches!(
        scanner.scan(&mut scene, &request("x")),
        Err(ScanError::UnknownSensor(_))
    ));

    let mut scene = scan_scene();
    let mut broken = RaycastScanner::new(
        ScannerSettings {
            azimuth_step_deg: 0.0,
            ..settings()
        },
        std::env::temp_dir(),
    );
    assert!(matches!(
        broken.scan(&mut scene, &request("x")),
        Err(ScanError::InvalidSettings(_))
    ));

    // A vanishing step would cast billions of rays.
    let mut too_fine = RaycastScanner::new(
        ScannerSettings {
            azimuth_step_deg: 1e-6,
            ..settings()
        },
        std::env::temp_dir(),
    );
    assert!(matches!(
        too_fine.scan(&mut scene, &request("x")),
        Err(ScanError::InvalidSettings(msg)) if msg.contains("at least")
    ));
    assert_eq!(scene.list_objects_matching(&ObjectQuery::default()).len(), 3);
}

#[test]
fn test_create_scene_couples_and_persists() {
    let tug_chain = parse_str(TUG).expect("tug");
    let aircraft_chain = parse_str(AIRCRAFT).expect("aircraft");
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AssetLayout::new(dir.path(), &LayoutConfig::default(), "t5", "a320_ceo");

    let create = CreateConfig {
        surfaces: vec![SurfaceSpec {
            name: "cube".into(),
            center: Vec3::new(1.0, 2.0, 0.5),
            half_extents: Vec3::splat(0.5),
        }],
        ..CreateConfig::default()
    };
    let scene = create_scene(
        &create,
        &Coupling::default(),
        (Body { name: "t5", chain: &tug_chain }, &layout.tug),
        (Body { name: "a320_ceo", chain: &aircraft_chain }, &layout.aircraft),
    )
    .expect("scene");

    let aircraft = scene.placement("a320_ceo").expect("aircraft");
    assert!(aircraft.position.abs_diff_eq(Vec3::new(0.7, 0.0, 0.0), 1e-6));
    assert!(scene.object("wall_north").is_some());
    assert!(scene.object("floor").is_some());
    assert_eq!(
        scene.list_objects_matching(&ObjectQuery::meshes().named_like("cube")),
        ["cube"]
    );
    assert!(
        scene
            .object("t5")
            .and_then(|o| o.source.as_deref())
            .is_some_and(|s| s.ends_with("t5.stl"))
    );

    let path = dir.path().join("scene.json");
    scene.save(&path).expect("save");
    let loaded = MemoryScene::load(&path).expect("load");
    assert_eq!(loaded, scene);
}

#[test]
fn test_load_missing_scene_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        MemoryScene::load(dir.path().join("nope.json")),
        Err(SceneError::Io { .. })
    ));
}

#[test]
fn test_layout_requires_both_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AssetLayout::new(dir.path(), &LayoutConfig::default(), "t5", "a320_ceo");

    std::fs::create_dir_all(dir.path().join("Tugs")).expect("mkdir");
    std::fs::create_dir_all(dir.path().join("AC")).expect("mkdir");
    for file in ["Tugs/t5.urdf", "Tugs/t5.stl", "AC/a320_ceo.urdf"] {
        std::fs::write(dir.path().join(file), "").expect("write");
    }

    match layout.verify() {
        Err(ConfigError::MissingAsset { role, name, path }) => {
            assert_eq!(role, BodyRole::Dependent);
            assert_eq!(name, "a320_ceo");
            assert!(path.ends_with("AC/a320_ceo.ply"));
        }
        other => panic!("expected a missing aircraft geometry, got {other:?}"),
    }

    std::fs::write(dir.path().join("AC/a320_ceo.ply"), "").expect("write");
    layout.verify().expect("complete layout");

    let out = layout.ensure_output_dir().expect("output dir");
    assert!(out.is_dir());
    assert!(out.ends_with("Outputs"));
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.toml");
    std::fs::write(
        &path,
        r#"
log_level = "debug"

[sweep]
orientations = [0, 90]

[sensor]
z_offset = 0.3

[scanner]
channels = 8
"#,
    )
    .expect("write");

    let config = RunConfig::load(&path).expect("config");
    assert_eq!(config.sweep.orientations, [0, 90]);
    assert_eq!(config.sweep.coupling, Coupling::default());
    assert_eq!(config.sweep.surface_pattern, "cube");
    assert_eq!(config.sensor.z_offset, 0.3);
    assert_eq!(config.sensor.name, "lidar");
    assert_eq!(config.scanner.channels, 8);
    assert!(config.scanner.export);
    assert_eq!(config.log_level.as_deref(), Some("debug"));

    std::fs::write(&path, "[sweep]\nangles = [1]\n").expect("write");
    assert!(matches!(RunConfig::load(&path), Err(ConfigError::Parse { .. })));
}
