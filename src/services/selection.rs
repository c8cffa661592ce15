use rand::seq::SliceRandom;
use rand::Rng;

/// Picks the question subset for a new attempt.
///
/// `None` means "use every question in natural order": either no count was
/// configured or it covers the whole pool. Otherwise the result is a uniform
/// sample without replacement, in random order.
pub(crate) fn select_questions<R: Rng + ?Sized>(
    questions_to_ask: Option<i32>,
    question_ids: &[String],
    rng: &mut R,
) -> Option<Vec<String>> {
    let requested = usize::try_from(questions_to_ask?).ok().filter(|count| *count > 0)?;
    if requested >= question_ids.len() {
        return None;
    }

    let mut pool = question_ids.to_vec();
    let (picked, _) = pool.partial_shuffle(rng, requested);
    Some(picked.to_vec())
}
