#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use sanchez::av::{
        FrameMuxer, FrameSource, ImageFileSource, ImageSource, MemoryReader, MuxBackend, MuxStream,
        FrameReader,
    };
    use sanchez::error::{FormatError, Result, SanchezError};
    use sanchez::format::{Container, ContainerHeader, ContainerReader};
    use sanchez::{
        DecodeOptions, Decoder, EncodeOptions, Encoder, ExtractOptions, FrameFormat,
        ImageEncodeOptions, RawFrame, Resolution,
    };
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use std::sync::Arc;

    /// Frames with distinct content so ordering mistakes show up.
    fn clip(count: usize, width: u32, height: u32) -> Vec<RawFrame> {
        (0..count)
            .map(|i| {
                let data: Vec<u8> = (0..(width * height * 3) as usize)
                    .map(|p| ((p + i * 37) % 251) as u8)
                    .collect();
                RawFrame::new(width, height, data).unwrap()
            })
            .collect()
    }

    struct MemorySource {
        frames: Vec<RawFrame>,
        fps: f64,
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn open(&self, _path: &Path) -> Result<Box<dyn FrameReader>> {
            Ok(Box::new(MemoryReader::new(self.frames.clone(), self.fps)))
        }
    }

    struct FixedImage(RawFrame);

    #[async_trait]
    impl ImageSource for FixedImage {
        async fn load(&self, _path: &Path) -> Result<RawFrame> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Recording {
        stream: Option<MuxStream>,
        frames: Vec<RawFrame>,
        finished: bool,
    }

    #[derive(Default, Clone)]
    struct RecordingBackend(Arc<Mutex<Recording>>);

    /// Writes its output file only when finished, like a real muxer's final rename.
    struct RecordingMuxer {
        recording: Arc<Mutex<Recording>>,
        output: PathBuf,
    }

    #[async_trait]
    impl MuxBackend for RecordingBackend {
        async fn open(&self, output: &Path, stream: &MuxStream) -> Result<Box<dyn FrameMuxer>> {
            self.0.lock().stream = Some(stream.clone());
            Ok(Box::new(RecordingMuxer {
                recording: self.0.clone(),
                output: output.to_path_buf(),
            }))
        }
    }

    #[async_trait]
    impl FrameMuxer for RecordingMuxer {
        async fn write_frame(&mut self, frame: &RawFrame) -> Result<()> {
            self.recording.lock().frames.push(frame.clone());
            Ok(())
        }

        async fn finish(&mut self) -> Result<()> {
            tokio::fs::write(&self.output, b"muxed").await?;
            self.recording.lock().finished = true;
            Ok(())
        }
    }

    fn video_encoder(frames: Vec<RawFrame>, fps: f64) -> Encoder {
        Encoder::with_sources(
            Arc::new(MemorySource { frames, fps }),
            Arc::new(ImageFileSource::new()),
        )
        .with_workers(3)
    }

    /// Scribbles over the stored blob of frame `index` in a container file.
    async fn damage_frame(path: &Path, index: usize) -> Result<()> {
        let mut bytes = tokio::fs::read(path).await?;
        let header = ContainerHeader::parse(&bytes)?;
        let entry = header.entry(index)?;
        let start = header.header_len + entry.offset as usize;
        for b in &mut bytes[start..start + entry.length as usize] {
            *b = 0xAA;
        }
        tokio::fs::write(path, &bytes).await?;
        Ok(())
    }

    fn is_codec_error(err: &SanchezError) -> bool {
        matches!(err, SanchezError::Codec(_))
    }

    fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_image_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("portal.png");
        let original = RawFrame::solid(64, 64, [0, 200, 80]);
        sanchez::av::save_frame(&original, &source, FrameFormat::Png).await?;

        let container_path = dir.path().join("portal.sanchez");
        let summary = Encoder::new()
            .encode_path(
                &source,
                &container_path,
                &EncodeOptions::new().with_title("rick").with_creator("cbx"),
            )
            .await?;
        assert!(summary.is_image);
        assert!(summary.compressed);
        assert_eq!(summary.frame_count, 1);

        let decoder = Decoder::new();
        let info = decoder.get_info(&container_path).await?;
        assert_eq!(info.title, "rick");
        assert_eq!(info.creator, "cbx");
        assert!(info.is_image);
        assert_eq!(info.frame_count, 1);
        assert_eq!((info.width, info.height), (64, 64));
        assert_eq!(info.duration_seconds, 0.0);
        assert!(info.file_size_mb > 0.0);

        let restored = dir.path().join("restored.png");
        decoder
            .decode_to_image(&container_path, &restored, 0, None)
            .await?;
        assert_eq!(ImageFileSource.load(&restored).await?, original);
        Ok(())
    }

    #[tokio::test]
    async fn test_image_resize_and_bad_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("still.sanchez");
        let encoder = Encoder::with_sources(
            Arc::new(MemorySource {
                frames: Vec::new(),
                fps: 1.0,
            }),
            Arc::new(FixedImage(RawFrame::solid(40, 30, [9, 9, 9]))),
        );
        encoder
            .encode_image(
                "ignored.jpg",
                &container_path,
                &ImageEncodeOptions::new().with_resize(Resolution::new(20, 10)),
            )
            .await?;

        let decoder = Decoder::new();
        let info = decoder.get_info(&container_path).await?;
        assert_eq!(info.resolution(), Resolution::new(20, 10));

        let err = decoder
            .decode_to_image(&container_path, dir.path().join("x.png"), 1, None)
            .await
            .unwrap_err();
        match err {
            SanchezError::OutOfRange { index, frame_count } => {
                assert_eq!((index, frame_count), (1, 1))
            }
            other => panic!("expected out of range, got {:?}", other),
        }
        assert!(!dir.path().join("x.png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_video_max_frames_and_extract() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames = clip(10, 12, 8);
        let container_path = dir.path().join("cable.sanchez");

        let summary = video_encoder(frames.clone(), 5.0)
            .encode(
                "cable.mp4",
                &container_path,
                &EncodeOptions::new().with_max_frames(3),
            )
            .await?;
        assert_eq!(summary.frame_count, 3);
        assert!(!summary.is_image);

        let decoder = Decoder::new();
        let info = decoder.get_info(&container_path).await?;
        assert_eq!(info.frame_count, 3);
        assert_eq!(info.fps, 5.0);
        assert_eq!(info.duration_seconds, 0.6);

        let out_dir = dir.path().join("cable_frames");
        let paths = decoder
            .extract_all_frames(&container_path, &out_dir, &ExtractOptions::default())
            .await?;
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["frame_000000.png", "frame_000001.png", "frame_000002.png"]
        );
        assert_eq!(std::fs::read_dir(&out_dir)?.count(), 3);
        for (path, expected) in paths.iter().zip(&frames) {
            assert_eq!(&ImageFileSource.load(path).await?, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_truncation_is_a_prefix() -> Result<()> {
        let frames = clip(10, 6, 6);
        let options = EncodeOptions::new().with_compression(false);

        let truncated = video_encoder(Vec::new(), 24.0)
            .encode_reader(
                &mut MemoryReader::new(frames.clone(), 24.0),
                &options.clone().with_max_frames(4),
            )
            .await?;
        let exact = video_encoder(Vec::new(), 24.0)
            .encode_reader(&mut MemoryReader::new(frames[..4].to_vec(), 24.0), &options)
            .await?;

        assert_eq!(truncated.index, exact.index);
        assert_eq!(truncated.payload, exact.payload);
        assert_eq!(truncated.metadata.frame_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_resize_applies_to_every_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("resized.sanchez");
        let target = Resolution::new(16, 8);
        video_encoder(clip(5, 30, 20), 24.0)
            .encode(
                "in.mp4",
                &container_path,
                &EncodeOptions::new().with_resize(target),
            )
            .await?;

        let mut reader = ContainerReader::open(&container_path).await?;
        assert_eq!(reader.metadata().resolution(), target);
        for i in 0..reader.frame_count() {
            let frame = reader.read_frame(i).await?;
            assert_eq!(frame.resolution(), target);
            assert_eq!(Some(frame.len()), target.frame_size());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_decode_feeds_muxer_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames = clip(7, 10, 6);
        let container_path = dir.path().join("order.sanchez");
        video_encoder(frames.clone(), 12.0)
            .encode("in.mp4", &container_path, &EncodeOptions::default())
            .await?;

        let backend = RecordingBackend::default();
        let decoder = Decoder::with_muxer(Arc::new(backend.clone())).with_workers(4);
        let audio = PathBuf::from("theme.mp3");
        let summary = decoder
            .decode(
                &container_path,
                dir.path().join("order.mp4"),
                &DecodeOptions::new().with_audio(&audio),
            )
            .await?;
        assert_eq!(summary.frame_count, 7);

        let recording = backend.0.lock();
        assert!(recording.finished);
        assert!(dir.path().join("order.mp4").exists());
        assert_eq!(recording.frames, frames);
        assert_eq!(
            recording.stream,
            Some(MuxStream {
                resolution: Resolution::new(10, 6),
                fps: 12.0,
                audio: Some(audio),
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_decode_resize() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("big.sanchez");
        video_encoder(clip(3, 20, 20), 24.0)
            .encode("in.mp4", &container_path, &EncodeOptions::default())
            .await?;

        let backend = RecordingBackend::default();
        Decoder::with_muxer(Arc::new(backend.clone()))
            .decode(
                &container_path,
                dir.path().join("small.mp4"),
                &DecodeOptions::new().with_resize(Resolution::new(10, 4)),
            )
            .await?;
        let recording = backend.0.lock();
        assert_eq!(recording.frames.len(), 3);
        assert!(recording
            .frames
            .iter()
            .all(|f| f.resolution() == Resolution::new(10, 4)));
        Ok(())
    }

    #[tokio::test]
    async fn test_damaged_frame_leaves_no_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("damaged.sanchez");
        video_encoder(clip(6, 8, 8), 24.0)
            .encode("in.mp4", &container_path, &EncodeOptions::default())
            .await?;
        damage_frame(&container_path, 3).await?;

        // The header is intact, so inspection still works
        let decoder = Decoder::new().with_workers(4);
        assert_eq!(decoder.get_info(&container_path).await?.frame_count, 6);

        // Undamaged frames still decode on their own
        let good = dir.path().join("good.png");
        decoder.decode_to_image(&container_path, &good, 2, None).await?;
        assert!(good.exists());

        let still = dir.path().join("bad.png");
        let err = decoder
            .decode_to_image(&container_path, &still, 3, None)
            .await
            .unwrap_err();
        assert!(is_codec_error(&err), "got {:?}", err);
        assert!(!still.exists());

        let backend = RecordingBackend::default();
        let video = dir.path().join("bad.mp4");
        let err = Decoder::with_muxer(Arc::new(backend.clone()))
            .with_workers(4)
            .decode(&container_path, &video, &DecodeOptions::default())
            .await
            .unwrap_err();
        assert!(is_codec_error(&err), "got {:?}", err);
        assert!(!backend.0.lock().finished);
        assert_eq!(backend.0.lock().frames.len(), 3);
        assert!(!video.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_is_all_or_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("damaged.sanchez");
        video_encoder(clip(8, 6, 6), 24.0)
            .encode("in.mp4", &container_path, &EncodeOptions::default())
            .await?;
        damage_frame(&container_path, 5).await?;
        let decoder = Decoder::new().with_workers(4);

        // A directory created by the call is removed again
        let fresh = dir.path().join("fresh_frames");
        let err = decoder
            .extract_all_frames(&container_path, &fresh, &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(is_codec_error(&err), "got {:?}", err);
        assert!(!fresh.exists());

        // An existing directory is left as it was
        let existing = dir.path().join("existing_frames");
        std::fs::create_dir(&existing)?;
        std::fs::write(existing.join("notes.txt"), b"keep me")?;
        assert!(decoder
            .extract_all_frames(&container_path, &existing, &ExtractOptions::default())
            .await
            .is_err());
        let left: Vec<String> = std::fs::read_dir(&existing)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(left, vec!["notes.txt".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_source_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("empty.sanchez");
        let err = video_encoder(Vec::new(), 24.0)
            .encode("empty.mp4", &container_path, &EncodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SanchezError::Source(_)));
        assert!(!container_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_not_a_container() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fake.sanchez");
        tokio::fs::write(&path, b"MEESEEKS and more bytes").await?;

        let err = Decoder::new().get_info(&path).await.unwrap_err();
        assert!(matches!(
            err,
            SanchezError::Format(FormatError::InvalidMagic(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_container_file_matches_in_memory_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let container_path = dir.path().join("model.sanchez");
        let frames = clip(4, 5, 5);
        let summary = video_encoder(frames.clone(), 30.0)
            .encode("in.mp4", &container_path, &EncodeOptions::default())
            .await?;

        let bytes = tokio::fs::read(&container_path).await?;
        assert_eq!(bytes.len() as u64, summary.container_bytes);
        let container = Container::deserialize(bytes)?;
        assert_eq!(container.payload.len() as u64, summary.payload_bytes);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(&container.decode_frame(i)?, frame);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_ffmpeg_round_trip() -> Result<()> {
        if !ffmpeg_available() {
            println!("ffmpeg not found, skipping");
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("testsrc.mp4");
        let status = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=size=32x24:rate=10",
                "-frames:v",
                "5",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&source)
            .status()?;
        assert!(status.success());

        let container_path = dir.path().join("testsrc.sanchez");
        let summary = Encoder::new()
            .encode(&source, &container_path, &EncodeOptions::default())
            .await?;
        assert_eq!(summary.frame_count, 5);
        assert_eq!(summary.resolution, Resolution::new(32, 24));

        let info = Decoder::new().get_info(&container_path).await?;
        assert_eq!(info.fps, 10.0);

        let output = dir.path().join("roundtrip.mp4");
        Decoder::new()
            .decode(&container_path, &output, &DecodeOptions::default())
            .await?;
        assert!(output.metadata()?.len() > 0);
        assert!(!sanchez::utils::partial_path(&output).exists());
        Ok(())
    }
}
