//! A chain of fragments linked in memory must evolve exactly like one grid.

use petri_automaton::{Cell, Fragment, Grid};
use petri_transfer::{BalancingLink, BorderExchange, FixedLink, Side, Slice};

const HEIGHT: usize = 9;

/// A scattered pattern with organisms of every mass band.
fn seeded(width: usize) -> Fragment {
    let mut fragment = Fragment::new(width, HEIGHT, 0).unwrap();
    for x in 1..width - 1 {
        for y in 1..HEIGHT - 1 {
            let h = (x * 7 + y * 13 + x * y) % 11;
            if h < 4 {
                fragment.set_cell(x, y, (h as i32 * 60 - 110) as Cell).unwrap();
            }
        }
    }
    fragment
}

/// Cut `global` into fragments that overlap by two columns.
fn split(global: &Grid, widths: &[usize]) -> Vec<Fragment> {
    let mut start = 0;
    let mut fragments = Vec::new();
    for &width in widths {
        let columns: Vec<&[Cell]> = (start..start + width).map(|x| global.column(x)).collect();
        let grid = Grid::from_columns(HEIGHT, columns).unwrap();
        let mut fragment = Fragment::new(width, HEIGHT, start as i64).unwrap();
        fragment.replace_grid(grid, 0).unwrap();
        fragments.push(fragment);
        start += width - 2;
    }
    assert_eq!(start + 2, global.width());
    fragments
}

/// Undo `split`, checking that offsets line up.
fn join(fragments: &[Fragment]) -> Grid {
    let mut columns: Vec<&[Cell]> = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(fragment.x_offset(), columns.len().saturating_sub(2) as i64);
        let skip = if i == 0 { 0 } else { 2 };
        columns.extend(fragment.grid().columns().skip(skip));
    }
    Grid::from_columns(HEIGHT, columns).unwrap()
}

fn reference(global_width: usize, steps: usize) -> Grid {
    let mut fragment = seeded(global_width);
    for _ in 0..steps {
        fragment.step();
    }
    fragment.grid().clone()
}

fn balancing_chain(count: usize) -> Vec<BorderExchange> {
    chain(count, |side, stream| BalancingLink::new(side, stream, HEIGHT), |left, right| {
        BorderExchange::Balancing { left, right }
    })
}

fn fixed_chain(count: usize) -> Vec<BorderExchange> {
    chain(count, |side, stream| FixedLink::new(side, stream, HEIGHT), |left, right| {
        BorderExchange::Fixed { left, right }
    })
}

fn chain<L>(
    count: usize,
    link: impl Fn(Side, tokio::io::DuplexStream) -> L,
    wrap: impl Fn(Option<L>, Option<L>) -> BorderExchange,
) -> Vec<BorderExchange> {
    let mut lefts: Vec<Option<L>> = vec![None];
    let mut rights: Vec<Option<L>> = Vec::new();
    for _ in 1..count {
        let (a, b) = tokio::io::duplex(4096);
        rights.push(Some(link(Side::Right, a)));
        lefts.push(Some(link(Side::Left, b)));
    }
    rights.push(None);
    lefts
        .into_iter()
        .zip(rights)
        .map(|(left, right)| wrap(left, right))
        .collect()
}

/// Step every fragment in its own task. Fragment `i` reports
/// `costs[i] * width` as its step time.
async fn run(
    fragments: Vec<Fragment>,
    exchanges: Vec<BorderExchange>,
    costs: &[u64],
    steps: usize,
) -> Vec<Fragment> {
    let mut tasks = Vec::new();
    for ((mut fragment, mut exchange), &cost) in fragments.into_iter().zip(exchanges).zip(costs) {
        tasks.push(tokio::spawn(async move {
            for _ in 0..steps {
                fragment.step();
                let step_nanos = cost * fragment.width() as u64;
                let out = exchange.exchange(fragment.grid(), step_nanos).await.unwrap();
                fragment.replace_grid(out.grid, out.x_shift).unwrap();
            }
            exchange.close().await.unwrap();
            fragment
        }));
    }
    let mut fragments = Vec::new();
    for task in tasks {
        fragments.push(task.await.unwrap());
    }
    fragments
}

#[tokio::test]
async fn fixed_chain_matches_single_grid() {
    let widths = [10, 10, 10];
    let global_width = 10 * 3 - 2 * 2;
    let fragments = split(seeded(global_width).grid(), &widths);

    let fragments = run(fragments, fixed_chain(3), &[1, 1, 1], 12).await;

    let total: usize = fragments.iter().map(Fragment::width).sum();
    assert_eq!(total, 30);
    for fragment in &fragments {
        assert_eq!(fragment.width(), 10);
    }
    assert_eq!(join(&fragments), reference(global_width, 12));
}

#[tokio::test]
async fn balancing_chain_matches_single_grid() {
    let widths = [14, 14, 14, 14];
    let global_width = 14 * 4 - 2 * 3;
    let fragments = split(seeded(global_width).grid(), &widths);

    let fragments = run(fragments, balancing_chain(4), &[9, 1, 4, 2], 15).await;

    let total: usize = fragments.iter().map(Fragment::width).sum();
    assert_eq!(total, 14 * 4, "width is conserved");
    assert_ne!(
        fragments.iter().map(Fragment::width).collect::<Vec<_>>(),
        vec![14; 4],
        "boundaries moved"
    );
    assert_eq!(join(&fragments), reference(global_width, 15));
}

#[tokio::test]
async fn slow_fragment_never_shrinks_past_floor() {
    let widths = [12, 12];
    let global_width = 22;
    let fragments = split(seeded(global_width).grid(), &widths);

    let fragments = run(fragments, balancing_chain(2), &[100, 1], 20).await;

    assert!(fragments[0].width() >= 7);
    assert_eq!(fragments[0].width() + fragments[1].width(), 24);
    assert_eq!(join(&fragments), reference(global_width, 20));
}

/// Equal zero-cost fragments at the narrowest balancing width trade the
/// floor back and forth instead of draining one side.
#[tokio::test]
async fn narrowest_pair_never_drains() {
    let widths = [9, 9];
    let global_width = 16;
    let fragments = split(seeded(global_width).grid(), &widths);

    let fragments = run(fragments, balancing_chain(2), &[0, 0], 30).await;

    for fragment in &fragments {
        assert!(fragment.width() >= petri_transfer::MIN_BALANCING_WIDTH);
    }
    assert_eq!(fragments[0].width() + fragments[1].width(), 18);
    assert_eq!(join(&fragments), reference(global_width, 30));
}

/// The faster fragment grows by one and receives the slower one's boundary
/// columns verbatim; the slower one shrinks by one.
#[tokio::test]
async fn faster_fragment_takes_the_slower_boundary() {
    for faster_is_left in [true, false] {
        let global = seeded(20);
        let mut fragments = split(global.grid(), &[11, 11]);
        for fragment in &mut fragments {
            fragment.step();
        }
        let (left_nanos, right_nanos) = if faster_is_left { (10, 90) } else { (90, 10) };

        let mut exchanges = balancing_chain(2);
        let mut right_exchange = exchanges.pop().unwrap();
        let mut left_exchange = exchanges.pop().unwrap();
        let (left_grid, right_grid) = (fragments[0].grid().clone(), fragments[1].grid().clone());

        let (left_out, right_out) = tokio::join!(
            left_exchange.exchange(&left_grid, left_nanos),
            right_exchange.exchange(&right_grid, right_nanos),
        );
        let (left_out, right_out) = (left_out.unwrap(), right_out.unwrap());

        if faster_is_left {
            assert_eq!(left_out.grid.width(), 12);
            assert_eq!(right_out.grid.width(), 10);
            let given = Slice::from_grid(&right_grid, Side::Left).unwrap();
            let received: Vec<&[Cell]> = left_out.grid.columns().skip(10).collect();
            assert_eq!(received, given.columns().collect::<Vec<_>>());
            assert_eq!(right_out.x_shift, 1);
        } else {
            assert_eq!(left_out.grid.width(), 10);
            assert_eq!(right_out.grid.width(), 12);
            let given = Slice::from_grid(&left_grid, Side::Right).unwrap();
            let received: Vec<&[Cell]> = right_out.grid.columns().take(2).collect();
            assert_eq!(received, given.columns().collect::<Vec<_>>());
            assert_eq!(right_out.x_shift, -1);
        }
        assert_eq!(left_out.x_shift, 0);
    }
}

#[tokio::test]
async fn dropped_neighbor_fails_the_exchange() {
    let mut exchanges = balancing_chain(2);
    drop(exchanges.pop());
    let mut left = exchanges.pop().unwrap();

    let grid = Grid::new(10, HEIGHT).unwrap();
    assert!(left.exchange(&grid, 1).await.is_err());
}
