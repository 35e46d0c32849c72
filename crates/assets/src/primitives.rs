//! Built-in meshes. Positions only, +Z up, centered on the origin.

use monet_common::Mesh;

/// Unit square in the XY plane, two triangles.
pub fn unit_quad() -> Mesh {
    let p = 0.5_f32;
    Mesh::from_positions(
        &[[-p, -p, 0.0], [p, -p, 0.0], [p, p, 0.0], [-p, p, 0.0]],
        vec![0, 1, 2, 2, 3, 0],
    )
}

/// Unit cube from its eight corners.
pub fn cube() -> Mesh {
    let p = 0.5_f32;
    #[rustfmt::skip]
    let corners = [
        [-p, -p, -p], [ p, -p, -p], [ p,  p, -p], [-p,  p, -p],
        [-p, -p,  p], [ p, -p,  p], [ p,  p,  p], [-p,  p,  p],
    ];
    #[rustfmt::skip]
    let indices = vec![
        4,5,6, 6,7,4, // +Z
        1,0,3, 3,2,1, // -Z
        5,1,2, 2,6,5, // +X
        0,4,7, 7,3,0, // -X
        7,6,2, 2,3,7, // +Y
        0,1,5, 5,4,0, // -Y
    ];
    Mesh::from_positions(&corners, indices)
}

/// Flat arrowhead pointing along +X, so an instance's direction is visible.
pub fn triangle() -> Mesh {
    Mesh::from_positions(
        &[[0.5, 0.0, 0.0], [-0.5, 0.35, 0.0], [-0.5, -0.35, 0.0]],
        vec![0, 1, 2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices_in_range(mesh: &Mesh) -> bool {
        let vertices = mesh.vertex_count() as u32;
        mesh.indices.iter().all(|&i| i < vertices)
    }

    #[test]
    fn quad_shape() {
        let quad = unit_quad();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert!(indices_in_range(&quad));
    }

    #[test]
    fn cube_shape() {
        let cube = cube();
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.index_count(), 36);
        assert!(indices_in_range(&cube));
    }

    #[test]
    fn triangle_points_along_x() {
        let tri = triangle();
        assert_eq!(tri.index_count(), 3);
        assert_eq!(&tri.vertices[..3], &[0.5, 0.0, 0.0]);
    }
}
