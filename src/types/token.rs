/// A cancellation token used to abort uploads.
///
/// This is a type alias for [`tokio_util::sync::CancellationToken`]. The
/// [`UploadCoordinator`](crate::UploadCoordinator) derives one child token per
/// upload from the token it is given, so cancelling the parent (e.g. in a
/// Ctrl+C handler) aborts every in-flight upload, while
/// [`UploadHandle::abort`](crate::UploadHandle::abort) aborts just one.
pub type UploadCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`UploadCancellationToken`].
///
/// # Example
///
/// ```
/// use s3browse_rs::create_upload_cancellation_token;
///
/// let token = create_upload_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// let child = token.child_token();
/// token.cancel();
/// assert!(child.is_cancelled());
/// ```
pub fn create_upload_cancellation_token() -> UploadCancellationToken {
    tokio_util::sync::CancellationToken::new()
}
