use anyhow::Result;

use super::canvas::OverlaySurface;
use super::skeleton::{
    KEYPOINT_COLOR, KEYPOINT_RADIUS, SKELETON_COLOR, SKELETON_CONNECTIONS, VISIBILITY_THRESHOLD,
};
use crate::pose::Pose;

/// Draws the detected pose over the live frame. Holds no state between
/// frames.
#[derive(Clone, Copy, Debug)]
pub struct OverlayRenderer {
    pub visibility_threshold: f32,
    pub keypoint_radius: i32,
    pub keypoint_color: u32,
    pub skeleton_color: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            visibility_threshold: VISIBILITY_THRESHOLD,
            keypoint_radius: KEYPOINT_RADIUS,
            keypoint_color: KEYPOINT_COLOR,
            skeleton_color: SKELETON_COLOR,
        }
    }
}

impl OverlayRenderer {
    /// Redraw the overlay for one frame of `frame_size`.
    ///
    /// `None` clears the overlay and presents it empty.
    pub fn render(
        &self,
        pose: Option<&Pose>,
        frame_size: (u32, u32),
        surface: &mut dyn OverlaySurface,
    ) -> Result<()> {
        if surface.size() != frame_size {
            surface.resize(frame_size.0, frame_size.1)?;
        }
        surface.clear()?;

        if let Some(pose) = pose {
            for keypoint in pose.iter() {
                if keypoint.is_visible(self.visibility_threshold) {
                    let (x, y) = keypoint.to_pixel();
                    surface.fill_circle(x, y, self.keypoint_radius, self.keypoint_color)?;
                }
            }

            for (start, end) in SKELETON_CONNECTIONS.iter() {
                let (start, end) = (pose.get(*start), pose.get(*end));
                if start.is_visible(self.visibility_threshold)
                    && end.is_visible(self.visibility_threshold)
                {
                    let (x0, y0) = start.to_pixel();
                    let (x1, y1) = end.to_pixel();
                    surface.draw_line(x0, y0, x1, y1, self.skeleton_color)?;
                }
            }
        }

        surface.present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Canvas;
    use crate::pose::KeypointIndex;

    #[derive(Default)]
    struct Recorder {
        size: (u32, u32),
        circles: Vec<(i32, i32)>,
        lines: Vec<(i32, i32, i32, i32)>,
        cleared: u32,
        presented: u32,
    }

    impl OverlaySurface for Recorder {
        fn size(&self) -> (u32, u32) {
            self.size
        }
        fn resize(&mut self, width: u32, height: u32) -> Result<()> {
            self.size = (width, height);
            Ok(())
        }
        fn clear(&mut self) -> Result<()> {
            self.cleared += 1;
            self.circles.clear();
            self.lines.clear();
            Ok(())
        }
        fn fill_circle(&mut self, cx: i32, cy: i32, _r: i32, _c: u32) -> Result<()> {
            self.circles.push((cx, cy));
            Ok(())
        }
        fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, _c: u32) -> Result<()> {
            self.lines.push((x0, y0, x1, y1));
            Ok(())
        }
        fn present(&mut self) -> Result<()> {
            self.presented += 1;
            Ok(())
        }
    }

    #[test]
    fn confident_pose_draws_every_marker_and_bone() {
        let pose = Pose::uniform(10.0, 20.0, 0.9);
        let mut surface = Recorder::default();
        OverlayRenderer::default()
            .render(Some(&pose), (64, 48), &mut surface)
            .unwrap();
        assert_eq!(surface.size, (64, 48));
        assert_eq!(surface.circles.len(), 17);
        assert_eq!(surface.lines.len(), 16);
        assert_eq!(surface.presented, 1);
    }

    #[test]
    fn threshold_is_strict() {
        let pose = Pose::uniform(10.0, 20.0, 0.3);
        let mut surface = Recorder::default();
        OverlayRenderer::default()
            .render(Some(&pose), (64, 48), &mut surface)
            .unwrap();
        assert!(surface.circles.is_empty());
        assert!(surface.lines.is_empty());
    }

    #[test]
    fn bone_needs_both_endpoints_visible() {
        let pose = Pose::from_fn(|index| match index {
            KeypointIndex::LeftElbow => (5.0, 5.0, 0.9),
            KeypointIndex::LeftWrist => (9.0, 9.0, 0.9),
            KeypointIndex::LeftShoulder => (1.0, 1.0, 0.2),
            _ => (0.0, 0.0, 0.0),
        });
        let mut surface = Recorder::default();
        OverlayRenderer::default()
            .render(Some(&pose), (64, 48), &mut surface)
            .unwrap();
        assert_eq!(surface.circles, vec![(5, 5), (9, 9)]);
        assert_eq!(surface.lines, vec![(5, 5, 9, 9)]);
    }

    #[test]
    fn no_pose_clears_previous_drawing() {
        let mut canvas = Canvas::new(64, 48);
        let renderer = OverlayRenderer::default();
        renderer
            .render(Some(&Pose::uniform(30.0, 20.0, 0.9)), (64, 48), &mut canvas)
            .unwrap();
        assert!(canvas.painted() > 0);
        renderer.render(None, (64, 48), &mut canvas).unwrap();
        assert_eq!(canvas.painted(), 0);
        assert_eq!(canvas.presented(), 2);
    }
}
