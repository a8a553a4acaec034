//! The stock scene: sky dome, floor, five "bunny" instances, an animated
//! ring of spheres, 32 seeded local lights and one global light.

use deferlight_common::{Axis, Material, hsv_to_rgb, rotate, translate, uniform_scale};
use glam::{Mat4, Vec3};

use crate::config::SceneConfig;
use crate::error::SceneError;
use crate::graph::{NodeId, SceneGraph, SceneNode};
use crate::light::Light;
use crate::mesh::MeshHandle;

/// Meshes the demo scene needs, already uploaded by the caller.
#[derive(Debug, Clone, Copy)]
pub struct DemoMeshes {
    pub sphere: MeshHandle,
    pub floor: MeshHandle,
    pub bunny: MeshHandle,
}

/// Built demo scene plus the handles its debug toggles act on.
#[derive(Debug, Clone)]
pub struct DemoScene {
    pub graph: SceneGraph,
    pub sky: NodeId,
    pub floor: NodeId,
    pub bunnies: Vec<NodeId>,
    pub spheres: NodeId,
    /// Groups driven by [`DemoScene::animate`].
    pub animated: Vec<NodeId>,
}

/// Degrees per second of the animated group's spin.
const SPIN_RATE: f32 = 10.0;

fn color(r: f32, g: f32, b: f32) -> Vec3 {
    Vec3::new(r, g, b) / 255.0
}

impl DemoScene {
    pub fn build(config: &SceneConfig, meshes: &DemoMeshes) -> Result<Self, SceneError> {
        let wood = color(87.0, 51.0, 35.0);
        let brick = color(134.0, 60.0, 56.0);
        let floor_color = color(96.0, 88.0, 48.0);
        let brass = Vec3::new(0.5, 0.5, 0.1);
        let grass = color(62.0, 102.0, 38.0);
        let bright_spec = Vec3::splat(0.5);
        let polished_spec = Vec3::splat(0.3);
        let polished_spec_hi = Vec3::splat(0.7);

        let mut graph = SceneGraph::new();
        let root = graph.create_node(SceneNode::group());
        graph.add_root(root, Mat4::IDENTITY)?;

        let sky = graph.create_node(SceneNode::mesh(meshes.sphere, Material::BLACK));
        graph.add(root, sky, uniform_scale(2000.0))?;

        let central = graph.create_node(SceneNode::group());
        graph.add(root, central, Mat4::IDENTITY)?;
        let anim = graph.create_node(SceneNode::group());
        graph.add(central, anim, translate(5.0, 0.0, 0.0))?;

        let spheres = sphere_ring(&mut graph, meshes.sphere)?;
        graph.add(anim, spheres, translate(0.0, 0.0, 1.0) * uniform_scale(16.0))?;
        if !config.show_spheres {
            graph.set_subtree_visible(spheres, false)?;
        }

        let placements = [
            ((-2.0, 2.0), Material::new(brick, bright_spec, 110.0)),
            ((0.0, 0.0), Material::new(wood, polished_spec, 30.0)),
            ((2.0, -2.0), Material::new(brass, bright_spec, 70.0)),
            ((2.0, 2.0), Material::new(brick, polished_spec_hi, 120.0)),
            ((-2.0, -2.0), Material::new(grass, bright_spec, 12.0)),
        ];
        let mut bunnies = Vec::with_capacity(placements.len());
        for ((x, y), material) in placements {
            let bunny = graph.create_node(SceneNode::mesh(meshes.bunny, material));
            graph.add(
                root,
                bunny,
                translate(x, y, 0.0) * rotate(Axis::X, 90.0) * uniform_scale(10.0),
            )?;
            bunnies.push(bunny);
        }

        let floor = graph.create_node(SceneNode::mesh(
            meshes.floor,
            Material::new(floor_color, Vec3::ZERO, 1.0),
        ));
        graph.add(root, floor, translate(0.0, 0.0, 0.02))?;

        let lights = graph.lights_mut();
        lights.seed_local(
            config.local_light_count,
            config.light_seed,
            config.attenuation,
        )?;
        lights.set_global(Light::new(
            config.global_light.position,
            config.global_light.color,
            config.attenuation,
        ))?;

        tracing::info!(
            nodes = graph.len(),
            lights = graph.lights().len(),
            "demo scene built"
        );

        Ok(Self {
            graph,
            sky,
            floor,
            bunnies,
            spheres,
            animated: vec![anim],
        })
    }

    /// Spin the animated groups about Z for time `seconds`.
    pub fn animate(&mut self, seconds: f32) -> Result<(), SceneError> {
        let spin = rotate(Axis::Z, SPIN_RATE * seconds);
        for id in &self.animated {
            self.graph.set_animation(*id, spin)?;
        }
        Ok(())
    }

    pub fn set_spheres_visible(&mut self, visible: bool) -> Result<(), SceneError> {
        self.graph.set_subtree_visible(self.spheres, visible)
    }

    pub fn set_bunnies_visible(&mut self, visible: bool) -> Result<(), SceneError> {
        for id in &self.bunnies {
            self.graph.set_visible(*id, visible)?;
        }
        Ok(())
    }
}

/// Hemisphere of small spheres, 20 around by 6 up, hue following the angle.
fn sphere_ring(graph: &mut SceneGraph, sphere: MeshHandle) -> Result<NodeId, SceneError> {
    let group = graph.create_node(SceneNode::group());
    let half_pi = std::f32::consts::FRAC_PI_2;
    for step in 0..20 {
        let angle = step as f32 * 18.0;
        for row_index in 0..6 {
            let row = 0.075 + row_index as f32 * half_pi / 6.0;
            let hue = hsv_to_rgb(angle / 360.0, 1.0 - row / half_pi, 1.0);
            let node = graph.create_node(SceneNode::mesh(
                sphere,
                Material::new(hue, Vec3::ONE, 120.0),
            ));
            let (s, c) = row.sin_cos();
            graph.add(
                group,
                node,
                rotate(Axis::Z, angle) * translate(c, 0.0, s) * uniform_scale(0.075 * c),
            )?;
        }
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DrawSink;
    use crate::mesh::MeshId;

    fn meshes() -> DemoMeshes {
        DemoMeshes {
            sphere: MeshHandle::Primitive(MeshId(0)),
            floor: MeshHandle::Primitive(MeshId(1)),
            bunny: MeshHandle::Loaded(MeshId(2)),
        }
    }

    struct Count(usize);

    impl DrawSink for Count {
        fn draw(&mut self, _: &Mat4, _: &MeshHandle, _: &Material) {
            self.0 += 1;
        }
    }

    fn draws(scene: &DemoScene) -> usize {
        let mut count = Count(0);
        scene.graph.draw(&mut count, Mat4::IDENTITY);
        count.0
    }

    #[test]
    fn default_scene_layout() {
        let scene = DemoScene::build(&SceneConfig::default(), &meshes()).unwrap();
        // sky + 5 bunnies + floor; the sphere ring starts hidden.
        assert_eq!(draws(&scene), 7);
        assert_eq!(scene.graph.lights().len(), 33);
        assert_eq!(scene.graph.lights().global_index(), Some(32));
        assert_eq!(
            scene.graph.lights().global().unwrap().color,
            Vec3::new(1.0, 1.0, 0.8)
        );
    }

    #[test]
    fn sphere_ring_toggle() {
        let mut scene = DemoScene::build(&SceneConfig::default(), &meshes()).unwrap();
        scene.set_spheres_visible(true).unwrap();
        assert_eq!(draws(&scene), 7 + 120);
        scene.set_bunnies_visible(false).unwrap();
        assert_eq!(draws(&scene), 2 + 120);
    }

    #[test]
    fn animation_moves_sphere_ring() {
        let mut scene = DemoScene::build(&SceneConfig::default(), &meshes()).unwrap();
        let before = scene.graph.world_transforms(Mat4::IDENTITY);
        scene.animate(9.0).unwrap();
        let after = scene.graph.world_transforms(Mat4::IDENTITY);
        let find = |list: &[(NodeId, Mat4)]| {
            list.iter()
                .find(|(id, _)| *id == scene.spheres)
                .map(|(_, m)| *m)
                .unwrap()
        };
        assert!(!find(&before).abs_diff_eq(find(&after), 1e-3));
    }

    #[test]
    fn lights_follow_config() {
        let config = SceneConfig {
            local_light_count: 4,
            ..SceneConfig::default()
        };
        let scene = DemoScene::build(&config, &meshes()).unwrap();
        assert_eq!(scene.graph.lights().len(), 5);
    }
}
