use std::fmt;
use std::sync::Arc;

use exposure_engine::scene::{Mesh, Surface};
use glam::{Mat4, Quat, Vec3};

/// Part key of the demo vehicle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Part {
    pub name: &'static str,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name)
    }
}

fn part(name: &'static str) -> Part {
    Part { name }
}

/// A small plane built from boxes, nose towards +Z.
///
/// Both wings and both tailplanes share one mesh each; only the transforms
/// differ.
pub fn plane() -> Vec<(Part, Vec<Surface>)> {
    let fuselage = Arc::new(Mesh::cuboid(Vec3::new(-0.6, -0.6, -4.0), Vec3::new(0.6, 0.6, 3.0)));
    let nose = Arc::new(Mesh::cuboid(Vec3::new(-0.4, -0.4, 3.0), Vec3::new(0.4, 0.4, 4.2)));
    let wing = Arc::new(Mesh::cuboid(Vec3::new(0.0, -0.08, -0.9), Vec3::new(4.5, 0.08, 0.9)));
    let tailplane = Arc::new(Mesh::cuboid(Vec3::new(0.0, -0.05, -0.5), Vec3::new(1.6, 0.05, 0.5)));
    let fin = Arc::new(Mesh::cuboid(Vec3::new(-0.05, 0.6, -4.0), Vec3::new(0.05, 2.2, -3.0)));

    let mirror = Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::PI));
    let wing_root = Vec3::new(0.6, 0.0, 0.5);
    let tail_root = Vec3::new(0.6, 0.3, -3.5);

    vec![
        (part("fuselage"), vec![Surface::new(fuselage, Mat4::IDENTITY)]),
        (part("nose"), vec![Surface::new(nose, Mat4::IDENTITY)]),
        (
            part("wing.left"),
            vec![Surface::new(wing.clone(), Mat4::from_translation(wing_root))],
        ),
        (
            part("wing.right"),
            vec![Surface::new(wing, mirror * Mat4::from_translation(wing_root))],
        ),
        (
            part("tail"),
            vec![
                Surface::new(tailplane.clone(), Mat4::from_translation(tail_root)),
                Surface::new(tailplane, mirror * Mat4::from_translation(tail_root * Vec3::new(1.0, -1.0, 1.0))),
                Surface::new(fin, Mat4::IDENTITY),
            ],
        ),
    ]
}
