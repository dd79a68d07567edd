use anchor_reloc_core::{AnchorPackage, CaptureType, FloorMarkerCapture, Pose, ReferenceImage};
use anchor_reloc_fiducial::{CatalogParams, FiducialCatalog, FiducialCategory, FiducialKind, FiducialName};
use nalgebra::{Point2, Point3};
use uuid::Uuid;

fn full_package() -> AnchorPackage {
    let mut p = AnchorPackage::new(
        Uuid::new_v4(),
        Point2::new(10.0, 20.0),
        Point3::new(0.0, -1.3, -2.0),
        Pose::identity(),
    );
    for t in CaptureType::ALL {
        p.reference_images.push(ReferenceImage::new(t, vec![0xAB; 8], 640, 480));
    }
    p.floor_marker = Some(FloorMarkerCapture::new(vec![0xCD; 8], Point2::new(0.3, 0.7), [480, 640]));
    p
}

#[test]
fn partial_params_fall_back_to_defaults() {
    let params: CatalogParams = serde_json::from_str(r#"{ "max_images": 3 }"#).expect("parse");
    assert_eq!(params.max_images, 3);
    assert_eq!(params.wall_width_m, CatalogParams::default().wall_width_m);
}

#[test]
fn floor_marker_is_registered_first_and_survives_cap() {
    let p = full_package();
    let params = CatalogParams {
        max_images: 3,
        ..CatalogParams::default()
    };
    let catalog = FiducialCatalog::build(std::slice::from_ref(&p), &params);
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.skipped(), 5);

    let first = catalog.iter().next().expect("first");
    assert_eq!(first.name.kind, FiducialKind::FloorMarker);
    assert_eq!(first.category, FiducialCategory::FloorNear);
}

#[test]
fn every_registered_name_decodes_back_to_its_package() {
    let a = full_package();
    let b = full_package();
    let params = CatalogParams {
        max_images: 32,
        ..CatalogParams::default()
    };
    let catalog = FiducialCatalog::build(&[a.clone(), b.clone()], &params);
    assert_eq!(catalog.len(), 16);

    for f in catalog.iter() {
        let decoded: FiducialName = f.image.name.parse().expect("decode");
        assert_eq!(decoded, f.name);
        assert!(decoded.package_id == a.id || decoded.package_id == b.id);
        assert_eq!(catalog.get(&decoded), Some(f));
    }
    assert_eq!(
        catalog.images_for(&FiducialCategory::ALL).len(),
        catalog.len()
    );
}
