//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the projection helpers the renderer needs.
//! Matrices are column-major, as nalgebra stores them and as GLSL expects them.

pub use nalgebra::{Matrix4, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Column-major matrix as uploaded to the GPU
pub type GpuMat4 = [[f32; 4]; 4];

/// Convert degrees to radians
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees.to_radians()
}

/// Perspective projection for Vulkan clip space.
///
/// Right-handed view space looking down -Z, depth mapped to `[0, 1]`, and the
/// Y axis flipped because Vulkan's framebuffer Y points down.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = 1.0 / (fov_y * 0.5).tan();

    let mut result = Mat4::zeros();
    result[(0, 0)] = f / aspect;
    result[(1, 1)] = -f;
    result[(2, 2)] = far / (near - far);
    result[(2, 3)] = near * far / (near - far);
    result[(3, 2)] = -1.0;
    result
}

/// Right-handed look-at view matrix
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}

/// Rotation around the Y axis
pub fn rotation_y(angle: f32) -> Mat4 {
    Mat4::from_axis_angle(&Vec3::y_axis(), angle)
}

/// Convert to the plain array layout used for uniform and push constant data
pub fn to_gpu(matrix: &Mat4) -> GpuMat4 {
    (*matrix).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn project_depth(proj: &Mat4, z: f32) -> f32 {
        let clip = proj * Vector4::new(0.0, 0.0, z, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_vulkan_depth() {
        let proj = perspective(deg_to_rad(45.0), 16.0 / 9.0, 0.1, 100.0);
        assert_relative_eq!(project_depth(&proj, -0.1), 0.0, epsilon = 1e-5);
        assert_relative_eq!(project_depth(&proj, -100.0), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = perspective(deg_to_rad(90.0), 1.0, 0.1, 10.0);
        let clip = proj * Vector4::new(0.0, 1.0, -1.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_to_gpu_is_column_major() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 5.0;
        let gpu = to_gpu(&m);
        assert_relative_eq!(gpu[3][0], 5.0);
    }

    #[test]
    fn test_look_at_moves_target_onto_negative_z() {
        let view = look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
        let p = view.transform_point(&Point3::origin());
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);
    }
}
