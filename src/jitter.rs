/// タイミングジッター
///
/// 送信前・待機前に短いランダムなビジーループを挟み、
/// マスク確認とブロッキング待機の間のような狭い競合窓を突く

use rand::Rng;

/// `[0, bound)` 回のビジーループを実行し、実行した回数を返す
///
/// ループ本体は揮発性書き込みなので最適化で消されない。
/// `bound` が0のときは何もしない
pub fn inject(bound: u32) -> u32 {
    if bound == 0 {
        return 0;
    }

    let busy_loops = rand::thread_rng().gen_range(0..bound);
    let mut sink = 0u32;
    for i in 0..busy_loops {
        // SAFETY: ローカル変数への書き込み
        unsafe { std::ptr::write_volatile(&mut sink, i) };
    }
    busy_loops
}
